//! PSI — cgroup-v2 pressure discovery and parsing.
//!
//! Linux exposes Pressure Stall Information per cgroup as `cpu.pressure`,
//! `memory.pressure`, and `io.pressure` files. The reader locates a
//! container's cgroup directory by probing well-known layout patterns and
//! decodes the `some`/`full` average lines into [`Pressure`] values.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::stats::model::{Pressure, PsiSet};

const SYSTEMD_SLICE: &str = "/sys/fs/cgroup/system.slice";
const CGROUPFS_DOCKER: &str = "/sys/fs/cgroup/docker";

/// Reader for per-container pressure files.
///
/// Construction probes the base directory once; a base without any
/// pressure file means the kernel (or the cgroup mode) does not support
/// PSI, and every later read short-circuits to `None`.
#[derive(Debug, Clone)]
pub struct PsiReader {
    base: PathBuf,
    supported: bool,
}

impl PsiReader {
    pub async fn detect(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        let supported = pressure_file_exists(&base).await;
        if !supported {
            warn!(
                base = %base.display(),
                "no pressure files under cgroup base, PSI metrics disabled"
            );
        }
        Self { base, supported }
    }

    pub fn supported(&self) -> bool {
        self.supported
    }

    /// Pressure for all three dimensions of one container. Dimensions whose
    /// file is missing come back as `None`; a present dimension is always
    /// fully populated.
    pub async fn read(&self, container_id: &str) -> PsiSet {
        if !self.supported {
            return PsiSet::default();
        }
        let dir = match self.container_dir(container_id).await {
            Some(dir) => dir,
            None => {
                debug!(container_id, "no cgroup directory found for container");
                return PsiSet::default();
            }
        };
        PsiSet {
            cpu: read_pressure_file(&dir.join("cpu.pressure")).await,
            memory: read_pressure_file(&dir.join("memory.pressure")).await,
            io: read_pressure_file(&dir.join("io.pressure")).await,
        }
    }

    /// Locate the container's cgroup directory: exact patterns first
    /// (systemd scope and cgroupfs layouts under the configured base, then
    /// the absolute well-known locations), then prefix globs.
    async fn container_dir(&self, container_id: &str) -> Option<PathBuf> {
        let candidates = [
            self.base.join(format!("docker-{container_id}.scope")),
            self.base.join("docker").join(container_id),
            PathBuf::from(SYSTEMD_SLICE).join(format!("docker-{container_id}.scope")),
            PathBuf::from(CGROUPFS_DOCKER).join(container_id),
        ];
        for candidate in candidates {
            if tokio::fs::metadata(&candidate).await.is_ok() {
                return Some(candidate);
            }
        }

        if let Some(found) =
            glob_prefix(Path::new(SYSTEMD_SLICE), &format!("docker-{container_id}")).await
        {
            return Some(found);
        }
        glob_prefix(Path::new(CGROUPFS_DOCKER), container_id).await
    }
}

async fn pressure_file_exists(base: &Path) -> bool {
    for name in ["cpu.pressure", "memory.pressure", "io.pressure"] {
        if tokio::fs::metadata(base.join(name)).await.is_ok() {
            return true;
        }
    }
    false
}

async fn glob_prefix(dir: &Path, prefix: &str) -> Option<PathBuf> {
    let mut entries = tokio::fs::read_dir(dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.file_name().to_string_lossy().starts_with(prefix) {
            return Some(entry.path());
        }
    }
    None
}

async fn read_pressure_file(path: &Path) -> Option<Pressure> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    parse_pressure(&contents)
}

/// Parse the line-oriented pressure format:
///
/// ```text
/// some avg10=0.12 avg60=0.08 avg300=0.02 total=123456
/// full avg10=0.00 avg60=0.00 avg300=0.00 total=0
/// ```
///
/// The `full` line is absent for the cpu dimension on older kernels; its
/// averages then stay zero so the dimension is never partially populated.
pub fn parse_pressure(text: &str) -> Option<Pressure> {
    let mut pressure = Pressure::default();
    let mut saw_some = false;

    for line in text.lines() {
        let mut parts = line.split_whitespace();
        let kind = match parts.next() {
            Some(k @ ("some" | "full")) => k,
            _ => continue,
        };
        let mut avgs = [0.0f64; 3];
        for part in parts {
            let (key, value) = match part.split_once('=') {
                Some(kv) => kv,
                None => continue,
            };
            let slot = match key {
                "avg10" => 0,
                "avg60" => 1,
                "avg300" => 2,
                _ => continue,
            };
            avgs[slot] = value.parse().unwrap_or(0.0);
        }
        match kind {
            "some" => {
                saw_some = true;
                pressure.some10 = avgs[0];
                pressure.some60 = avgs[1];
                pressure.some300 = avgs[2];
            }
            _ => {
                pressure.full10 = avgs[0];
                pressure.full60 = avgs[1];
                pressure.full300 = avgs[2];
            }
        }
    }

    if saw_some {
        Some(pressure)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_both_lines() {
        let text = "some avg10=1.23 avg60=0.45 avg300=0.06 total=987654\n\
                    full avg10=0.78 avg60=0.12 avg300=0.01 total=12345\n";
        let p = parse_pressure(text).unwrap();
        assert_eq!(p.some10, 1.23);
        assert_eq!(p.some60, 0.45);
        assert_eq!(p.some300, 0.06);
        assert_eq!(p.full10, 0.78);
        assert_eq!(p.full60, 0.12);
        assert_eq!(p.full300, 0.01);
    }

    #[test]
    fn parse_some_only_fills_full_with_zeros() {
        let text = "some avg10=0.50 avg60=0.25 avg300=0.05 total=42\n";
        let p = parse_pressure(text).unwrap();
        assert_eq!(p.some10, 0.50);
        assert_eq!(p.full10, 0.0);
        assert_eq!(p.full300, 0.0);
    }

    #[test]
    fn parse_garbage_is_none() {
        assert!(parse_pressure("").is_none());
        assert!(parse_pressure("not a pressure file\n").is_none());
    }

    #[tokio::test]
    async fn detect_unsupported_without_pressure_files() {
        let dir = tempfile::tempdir().unwrap();
        let reader = PsiReader::detect(dir.path()).await;
        assert!(!reader.supported());
        let set = reader.read("abc").await;
        assert!(set.cpu.is_none() && set.memory.is_none() && set.io.is_none());
    }

    #[tokio::test]
    async fn read_container_pressure_from_scope_dir() {
        let base = tempfile::tempdir().unwrap();
        // Base-level file marks PSI as supported.
        std::fs::write(
            base.path().join("cpu.pressure"),
            "some avg10=0.00 avg60=0.00 avg300=0.00 total=0\n",
        )
        .unwrap();

        let scope = base.path().join("docker-deadbeef.scope");
        std::fs::create_dir(&scope).unwrap();
        std::fs::write(
            scope.join("cpu.pressure"),
            "some avg10=2.50 avg60=1.00 avg300=0.10 total=5\n\
             full avg10=0.30 avg60=0.20 avg300=0.00 total=1\n",
        )
        .unwrap();
        std::fs::write(
            scope.join("memory.pressure"),
            "some avg10=0.10 avg60=0.05 avg300=0.00 total=2\n\
             full avg10=0.00 avg60=0.00 avg300=0.00 total=0\n",
        )
        .unwrap();
        // io.pressure intentionally missing.

        let reader = PsiReader::detect(base.path()).await;
        assert!(reader.supported());

        let set = reader.read("deadbeef").await;
        assert_eq!(set.cpu.unwrap().some10, 2.50);
        assert_eq!(set.cpu.unwrap().full10, 0.30);
        assert_eq!(set.memory.unwrap().some10, 0.10);
        assert!(set.io.is_none(), "missing file means missing dimension");
    }

    #[tokio::test]
    async fn read_container_pressure_from_cgroupfs_dir() {
        let base = tempfile::tempdir().unwrap();
        std::fs::write(
            base.path().join("io.pressure"),
            "some avg10=0.00 avg60=0.00 avg300=0.00 total=0\n",
        )
        .unwrap();

        let dir = base.path().join("docker").join("cafebabe");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("io.pressure"),
            "some avg10=9.99 avg60=5.55 avg300=1.11 total=777\n\
             full avg10=3.33 avg60=2.22 avg300=0.11 total=88\n",
        )
        .unwrap();

        let reader = PsiReader::detect(base.path()).await;
        let set = reader.read("cafebabe").await;
        assert_eq!(set.io.unwrap().some10, 9.99);
        assert_eq!(set.io.unwrap().full300, 0.11);
        assert!(set.cpu.is_none());
    }
}
