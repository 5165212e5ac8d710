// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Text output for listings, trees and metadata

use memfs_core::{DirEntry, FsCore, FsResult, FsStats, LinkKind, NodeInfo, NodeKind};

fn kind_char(kind: NodeKind, link: &LinkKind) -> char {
    match (kind, link) {
        (_, LinkKind::Symbolic(_)) => 'l',
        (NodeKind::Directory, _) => 'd',
        (NodeKind::File, _) => '-',
    }
}

/// Long listing: kind, permissions, size and name, one entry per line.
pub fn listing(entries: &[DirEntry]) -> String {
    let width = entries
        .iter()
        .map(|e| e.size.to_string().len())
        .max()
        .unwrap_or(1);
    entries
        .iter()
        .map(|e| {
            let mut line = format!(
                "{}{} {:>width$} {}",
                kind_char(e.kind, &e.link),
                e.permissions,
                e.size,
                e.name,
                width = width
            );
            if let LinkKind::Symbolic(target) = &e.link {
                line.push_str(" -> ");
                line.push_str(target);
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Indented tree below `path`; symbolic links are shown, never followed.
pub fn tree(fs: &FsCore, path: &str) -> FsResult<String> {
    let mut lines = vec![path.to_string()];
    walk(fs, path, "", &mut lines)?;
    Ok(lines.join("\n"))
}

fn walk(fs: &FsCore, dir: &str, prefix: &str, lines: &mut Vec<String>) -> FsResult<()> {
    let entries = fs.list_entries(dir)?;
    let count = entries.len();
    for (i, entry) in entries.into_iter().enumerate() {
        let last = i + 1 == count;
        let branch = if last { "`-- " } else { "|-- " };
        let mut line = format!("{}{}{}", prefix, branch, entry.name);
        match &entry.link {
            LinkKind::Symbolic(target) => {
                line.push_str(" -> ");
                line.push_str(target);
            }
            _ if entry.kind == NodeKind::Directory => line.push('/'),
            _ => {}
        }
        lines.push(line);

        if entry.kind == NodeKind::Directory {
            let child = if dir.ends_with('/') {
                format!("{}{}", dir, entry.name)
            } else {
                format!("{}/{}", dir, entry.name)
            };
            let nested = format!("{}{}", prefix, if last { "    " } else { "|   " });
            walk(fs, &child, &nested, lines)?;
        }
    }
    Ok(())
}

pub fn node_info(path: &str, info: &NodeInfo) -> String {
    let kind = match (&info.link, info.kind) {
        (LinkKind::Symbolic(_), _) => "symbolic link",
        (_, NodeKind::Directory) => "directory",
        (_, NodeKind::File) => "file",
    };
    let mut out = format!(
        "path: {}\nnode: {}\nkind: {}\npermissions: {}\nsize: {}",
        path, info.id, kind, info.permissions, info.size
    );
    match &info.link {
        LinkKind::Symbolic(target) => {
            out.push_str("\ntarget: ");
            out.push_str(target);
        }
        LinkKind::HardAlias(content) => {
            out.push_str(&format!("\nlinks: {} (content {})", info.refcount, content.0));
        }
        LinkKind::None => {
            if info.kind == NodeKind::File {
                out.push_str(&format!("\nlinks: {}", info.refcount));
            }
        }
    }
    out
}

pub fn stats(stats: &FsStats) -> String {
    format!(
        "nodes: {}/{}\nopen handles: {}\ncontent bytes: {}",
        stats.nodes, stats.capacity, stats.open_handles, stats.content_bytes
    )
}
