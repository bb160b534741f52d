//! # drive-backup
//!
//! Backs up files and directories into one compressed archive per source drive.
//!
//! ## Features
//!
//! - **Per-Drive Archives**: every source volume gets its own `tar.xz` container
//! - **Parallel Discovery**: directories are expanded cooperatively by a pool of workers
//! - **Single Writer per Archive**: each container is written by exactly one thread
//! - **Drain on Shutdown**: already queued files are always written before closing
//! - **Copy Policies**: glob exclusions and prior-backup based skipping
//!
//! ## Quick Start
//!
//! ```no_run
//! use drive_backup::backup::backup_config::BackupConfig;
//!
//! // Load configuration from YAML file
//! let config: BackupConfig = serde_yml::from_reader(std::fs::File::open("config.yml")?)?;
//!
//! // Run one backup
//! let outcome = config.build_controller()?.start(true);
//! println!("{outcome}");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
