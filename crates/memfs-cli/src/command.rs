// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

use clap::Subcommand;
use memfs_core::{
    ErrorKind, FaultPolicy, FsConfig, FsCore, FsError, FsResult, HandleId, OpenMode, Permissions,
};
use tracing::{debug, info};

use crate::render;

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create an empty store, refusing to overwrite an existing one
    Init {
        /// Replace an existing store
        #[arg(long)]
        force: bool,
    },
    /// Create a directory
    Mkdir {
        path: String,
        /// Permissions for the new directory (r, w or rw)
        #[arg(long)]
        mode: Option<Permissions>,
    },
    /// Create an empty file if it does not exist yet
    Touch {
        path: String,
        /// Permissions for a newly created file (r, w or rw)
        #[arg(long)]
        mode: Option<Permissions>,
    },
    /// List a directory (one name per line)
    Ls {
        #[arg(default_value = ".")]
        path: String,
        /// Show kind, permissions and size
        #[arg(short, long)]
        long: bool,
    },
    /// Change the persisted current directory
    Cd { path: String },
    /// Print the absolute path of the current directory
    Pwd,
    /// Remove a file, link or empty directory
    Rm { path: String },
    /// Move or rename a node
    Mv { src: String, dst: String },
    /// Copy a node, recursively for directories
    Cp { src: String, dst: String },
    /// Create a hard link, or a symbolic link with -s
    Ln {
        #[arg(short, long)]
        symbolic: bool,
        target: String,
        link: String,
    },
    /// Print the target of a symbolic link
    Readlink { path: String },
    /// Set permissions (r, w or rw)
    Chmod { mode: Permissions, path: String },
    /// Print file content
    Cat { path: String },
    /// Replace file content, creating the file if needed
    Write { path: String, data: String },
    /// Append to file content, creating the file if needed
    Append { path: String, data: String },
    /// Show node metadata
    Stat {
        path: String,
        /// Describe a symbolic link itself instead of its target
        #[arg(long)]
        no_follow: bool,
    },
    /// Print a directory tree
    Tree {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Show node and content usage
    Stats,
}

/// Run one command against an open filesystem and return its printable output.
///
/// `Init` replaces the store itself and is only meaningful through [`run`];
/// here it fails with `InvalidArgument`.
pub fn execute(fs: &mut FsCore, command: Command) -> FsResult<String> {
    debug!(?command, "executing");
    let output = match command {
        // Handled by `run` before any store is loaded
        Command::Init { .. } => return Err(FsError::InvalidArgument),
        Command::Mkdir { path, mode } => {
            let permissions = mode.unwrap_or(fs.config().default_permissions);
            fs.create_directory_with(&path, permissions)?;
            String::new()
        }
        Command::Touch { path, mode } => {
            ensure_file(fs, &path, mode)?;
            String::new()
        }
        Command::Ls { path, long } => {
            if long {
                render::listing(&fs.list_entries(&path)?)
            } else {
                fs.list_files(&path)?.join("\n")
            }
        }
        Command::Cd { path } => {
            fs.change_directory(&path)?;
            String::new()
        }
        Command::Pwd => fs.get_current_path()?,
        Command::Rm { path } => {
            fs.delete_file(&path)?;
            String::new()
        }
        Command::Mv { src, dst } => {
            fs.move_file(&src, &dst)?;
            String::new()
        }
        Command::Cp { src, dst } => {
            fs.copy_file(&src, &dst)?;
            String::new()
        }
        Command::Ln {
            symbolic,
            target,
            link,
        } => {
            if symbolic {
                fs.create_symbolic_link(&target, &link)?;
            } else {
                fs.create_hard_link(&target, &link)?;
            }
            String::new()
        }
        Command::Readlink { path } => fs.read_link(&path)?,
        Command::Chmod { mode, path } => {
            fs.set_permissions(&path, mode)?;
            String::new()
        }
        Command::Cat { path } => {
            let data = with_handle(fs, &path, OpenMode::Read, |fs, h| fs.read_file(h))?;
            String::from_utf8_lossy(&data).into_owned()
        }
        Command::Write { path, data } => {
            ensure_file(fs, &path, None)?;
            with_handle(fs, &path, OpenMode::Write, |fs, h| {
                fs.write_file(h, data.as_bytes())
            })?;
            String::new()
        }
        Command::Append { path, data } => {
            ensure_file(fs, &path, None)?;
            with_handle(fs, &path, OpenMode::Write, |fs, h| {
                fs.append_file(h, data.as_bytes())
            })?;
            String::new()
        }
        Command::Stat { path, no_follow } => {
            let info = if no_follow {
                fs.lstat(&path)?
            } else {
                fs.stat(&path)?
            };
            render::node_info(&path, &info)
        }
        Command::Tree { path } => render::tree(fs, &path)?,
        Command::Stats => render::stats(&fs.stats()),
    };
    Ok(output)
}

/// Load the store described by `config`, run `command` and save any changes.
///
/// A failed command leaves the store untouched.
pub fn run(config: FsConfig, faults: Option<FaultPolicy>, command: Command) -> FsResult<String> {
    if let Command::Init { force } = command {
        return init_store(config, faults, force);
    }

    let mut fs = FsCore::new(config)?;
    if let Some(policy) = faults {
        fs.fault_injector().set_policy(policy);
    }
    if fs.store_exists() {
        fs.load_file_system()?;
    }

    let output = execute(&mut fs, command)?;
    if fs.is_dirty() {
        fs.save_file_system()?;
    }
    fs.close_file_system()?;
    Ok(output)
}

fn init_store(config: FsConfig, faults: Option<FaultPolicy>, force: bool) -> FsResult<String> {
    let mut fs = FsCore::new(config)?;
    if let Some(policy) = faults {
        fs.fault_injector().set_policy(policy);
    }
    if fs.store_exists() && !force {
        return Err(FsError::AlreadyExists);
    }
    fs.save_file_system()?;
    info!("store initialised");
    fs.close_file_system()?;
    Ok(String::new())
}

fn ensure_file(fs: &mut FsCore, path: &str, mode: Option<Permissions>) -> FsResult<()> {
    match fs.get_file_by_path(path) {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            let permissions = mode.unwrap_or(fs.config().default_permissions);
            fs.create_file_with(path, permissions)?;
            Ok(())
        }
        Err(err) => Err(err),
    }
}

/// Open `path`, run `f` on the handle and close it whatever `f` returned.
fn with_handle<T>(
    fs: &mut FsCore,
    path: &str,
    mode: OpenMode,
    f: impl FnOnce(&mut FsCore, HandleId) -> FsResult<T>,
) -> FsResult<T> {
    let handle = fs.open_file(path, mode)?;
    let result = f(fs, handle);
    let closed = fs.close_file(handle);
    let value = result?;
    closed?;
    Ok(value)
}
