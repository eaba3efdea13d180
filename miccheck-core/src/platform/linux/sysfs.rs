//! sysfs and procfs readers

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

use crate::error::ProbeError;

const INTEL_VENDOR_ID: &str = "0x8086";

// x200 family; 0x2264 is reserved for the DMA channels
static X200_DEVICE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^0x226[01235]$").expect("device id pattern is valid"));

static MIC_ENTRY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^mic\d+$").expect("mic entry pattern is valid"));

/// Locations of the kernel interfaces the Linux checks read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysfsLayout {
    pub pci_devices: PathBuf,
    pub mic_class: PathBuf,
    pub proc: PathBuf,
}

impl Default for SysfsLayout {
    fn default() -> Self {
        Self::rooted(Path::new("/"))
    }
}

impl SysfsLayout {
    /// Layout below an alternate root directory
    pub fn rooted(root: &Path) -> Self {
        Self {
            pci_devices: root.join("sys/bus/pci/devices"),
            mic_class: root.join("sys/class/mic"),
            proc: root.join("proc"),
        }
    }

    pub fn device_dir(&self, index: u32) -> PathBuf {
        self.mic_class.join(format!("mic{}", index))
    }

    /// Read a per-card attribute such as `state` or `info/bios_version`
    pub async fn device_attr(&self, index: u32, attr: &str) -> Result<String, ProbeError> {
        read_attr(&self.device_dir(index).join(attr)).await
    }

    /// Number of x200 coprocessors on the PCI bus
    pub async fn count_pci_cards(&self) -> Result<u32, ProbeError> {
        let mut count = 0;
        for dir in list_dir(&self.pci_devices).await? {
            let (Ok(vendor), Ok(device)) = (
                read_attr(&dir.join("vendor")).await,
                read_attr(&dir.join("device")).await,
            ) else {
                continue;
            };
            if vendor == INTEL_VENDOR_ID && X200_DEVICE_ID.is_match(&device) {
                trace!(path = %dir.display(), %device, "found coprocessor");
                count += 1;
            }
        }
        Ok(count)
    }

    /// Number of `micN` nodes the driver created
    pub async fn count_driver_cards(&self) -> Result<u32, ProbeError> {
        let entries = list_dir(&self.mic_class).await?;
        let count = entries
            .iter()
            .filter_map(|p| p.file_name().and_then(|n| n.to_str()))
            .filter(|n| MIC_ENTRY.is_match(n))
            .count();
        Ok(count as u32)
    }

    /// Names of the loaded kernel modules
    pub async fn loaded_modules(&self) -> Result<BTreeSet<String>, ProbeError> {
        let modules = read_attr(&self.proc.join("modules")).await?;
        Ok(modules
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect())
    }

    /// Whether a process called `name` runs with parent `ppid`
    pub async fn process_running(&self, name: &str, ppid: u32) -> Result<bool, ProbeError> {
        let ppid = ppid.to_string();
        for dir in list_dir(&self.proc).await? {
            // processes may exit while we scan
            let Ok(status) = tokio::fs::read_to_string(dir.join("status")).await else {
                continue;
            };
            let field = |key: &str| {
                status.lines().find_map(|line| {
                    let (k, v) = line.split_once(':')?;
                    (k.trim() == key).then(|| v.trim())
                })
            };
            if field("Name") == Some(name) && field("PPid") == Some(ppid.as_str()) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Read an attribute file, trimming trailing whitespace
pub async fn read_attr(path: &Path) -> Result<String, ProbeError> {
    tokio::fs::read_to_string(path)
        .await
        .map(|s| s.trim_end().to_string())
        .map_err(|source| ProbeError::Attribute {
            path: path.to_path_buf(),
            source,
        })
}

async fn list_dir(path: &Path) -> Result<Vec<PathBuf>, ProbeError> {
    let attr_err = |source| ProbeError::Attribute {
        path: path.to_path_buf(),
        source,
    };
    let mut dir = tokio::fs::read_dir(path).await.map_err(attr_err)?;
    let mut entries = Vec::new();
    while let Some(entry) = dir.next_entry().await.map_err(attr_err)? {
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}


#[cfg(test)]
mod tests {
    use super::fixture::FakeSysfs;
    use super::*;

    #[tokio::test]
    async fn test_count_pci_cards() {
        let fake = FakeSysfs::new();
        fake.pci_device("0000:01:00.0", "0x8086", "0x2260")
            .pci_device("0000:02:00.0", "0x8086", "0x2263")
            .pci_device("0000:02:00.1", "0x8086", "0x2264")
            .pci_device("0000:03:00.0", "0x10de", "0x2260")
            .pci_device("0000:04:00.0", "0x8086", "0x226A");

        assert_eq!(fake.layout.count_pci_cards().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_count_driver_cards() {
        let fake = FakeSysfs::new();
        fake.card(0).card(1);
        std::fs::create_dir_all(fake.layout.mic_class.join("ctrl")).unwrap();

        assert_eq!(fake.layout.count_driver_cards().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_missing_tree_is_an_error() {
        let layout = SysfsLayout::rooted(Path::new("/nonexistent/miccheck"));
        let err = layout.count_driver_cards().await.unwrap_err();
        assert!(err
            .to_string()
            .starts_with("could not read /nonexistent/miccheck/sys/class/mic"));
    }

    #[tokio::test]
    async fn test_loaded_modules() {
        let fake = FakeSysfs::new();
        fake.modules(&["scif", "vop"]);
        let modules = fake.layout.loaded_modules().await.unwrap();
        assert!(modules.contains("scif"));
        assert!(modules.contains("vop"));
        assert_eq!(modules.len(), 2);
    }

    #[tokio::test]
    async fn test_process_running() {
        let fake = FakeSysfs::new();
        fake.process(100, "mpssd", 57).process(200, "bash", 1);
        assert!(!fake.layout.process_running("mpssd", 1).await.unwrap());

        fake.process(300, "mpssd", 1);
        assert!(fake.layout.process_running("mpssd", 1).await.unwrap());
    }

    #[tokio::test]
    async fn test_device_attr_is_trimmed() {
        let fake = FakeSysfs::new();
        fake.card(0).attr(0, "info/bios_version", "GVPRCRB8.86B.0012.R02.1603250339 ");
        assert_eq!(
            fake.layout.device_attr(0, "info/bios_version").await.unwrap(),
            "GVPRCRB8.86B.0012.R02.1603250339"
        );
    }
}
