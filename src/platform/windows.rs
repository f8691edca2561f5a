use std::path::{Path, PathBuf};

use super::{Platform, resolve_data_dir};

pub struct NativePlatform;

impl Platform for NativePlatform {
    fn restrict_dir_permissions(_path: &Path) {}

    fn restrict_file_permissions(_path: &Path) {}

    fn find_pids_on_port(port: u16) -> Vec<String> {
        let Ok(output) = std::process::Command::new("cmd")
            .args(["/c", &format!("netstat -ano | findstr :{}", port)])
            .output()
        else {
            return Vec::new();
        };
        let Ok(text) = String::from_utf8(output.stdout) else {
            return Vec::new();
        };
        let mut pids = Vec::new();
        for line in text.lines() {
            if let Some(pid) = line.split_whitespace().last() {
                let pid = pid.trim();
                if !pid.is_empty() && pid.chars().all(|c| c.is_ascii_digit()) {
                    pids.push(pid.to_string());
                }
            }
        }
        pids.sort();
        pids.dedup();
        pids
    }

    fn data_dir() -> PathBuf {
        let base = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));
        resolve_data_dir(base.join("noisett"))
    }
}
