// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Store codec and save/load of the whole filesystem

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::FsLimits;
use crate::error::{FsError, FsResult};
use crate::storage::{ContentEntry, ContentStore};
use crate::store::NodeStore;
use crate::tree::{Node, NodeBody, Tree};
use crate::vfs::FsCore;
use crate::{ContentId, NodeId, Permissions};

const STORE_FORMAT: &str = "memfs-store";
const STORE_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoreImage {
    format: String,
    version: u32,
    max_files: usize,
    /// Live nodes including the root
    node_count: usize,
    root: NodeId,
    current_directory: NodeId,
    slot_generations: Vec<u32>,
    next_content_id: u64,
    nodes: Vec<NodeRecord>,
    contents: Vec<ContentRecord>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct NodeRecord {
    id: NodeId,
    name: String,
    parent: Option<NodeId>,
    permissions: Permissions,
    body: NodeBody,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct ContentRecord {
    id: ContentId,
    refcount: usize,
    /// Hex-encoded bytes
    data: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoreFile {
    image: StoreImage,
    /// blake3 of the compact JSON encoding of `image`
    checksum: String,
}

fn checksum(image: &StoreImage) -> FsResult<String> {
    let bytes = serde_json::to_vec(image).map_err(|err| FsError::Io(err.into()))?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

pub(crate) fn encode(tree: &Tree) -> FsResult<Vec<u8>> {
    let nodes: Vec<NodeRecord> = tree
        .nodes()
        .iter()
        .map(|(id, node)| NodeRecord {
            id,
            name: node.name.clone(),
            parent: node.parent,
            permissions: node.permissions,
            body: node.body.clone(),
        })
        .collect();
    let contents = tree
        .contents()
        .iter()
        .map(|(id, entry)| ContentRecord {
            id,
            refcount: entry.refcount,
            data: hex::encode(&entry.data),
        })
        .collect();
    let image = StoreImage {
        format: STORE_FORMAT.to_string(),
        version: STORE_VERSION,
        max_files: tree.limits().max_files,
        node_count: nodes.len(),
        root: tree.root(),
        current_directory: tree.cwd(),
        slot_generations: tree.nodes().generations(),
        next_content_id: tree.contents().next_id(),
        nodes,
        contents,
    };
    let file = StoreFile {
        checksum: checksum(&image)?,
        image,
    };
    serde_json::to_vec_pretty(&file).map_err(|err| FsError::Io(err.into()))
}

/// Decode and fully validate a store. Nothing is returned unless every
/// invariant holds.
pub(crate) fn decode(bytes: &[u8], limits: &FsLimits) -> FsResult<Tree> {
    let file: StoreFile = serde_json::from_slice(bytes)
        .map_err(|err| FsError::corrupt(format!("malformed store: {}", err)))?;
    let image = file.image;

    if image.format != STORE_FORMAT {
        return Err(FsError::corrupt(format!("unknown format {:?}", image.format)));
    }
    if image.version != STORE_VERSION {
        return Err(FsError::corrupt(format!("unsupported version {}", image.version)));
    }
    if checksum(&image)? != file.checksum {
        return Err(FsError::corrupt("checksum mismatch"));
    }
    if image.node_count != image.nodes.len() {
        return Err(FsError::corrupt(format!(
            "header says {} nodes, found {}",
            image.node_count,
            image.nodes.len()
        )));
    }
    let non_root = image.node_count.saturating_sub(1);
    if image.node_count == 0 || non_root > image.max_files || non_root > limits.max_files {
        return Err(FsError::corrupt(format!(
            "{} nodes do not fit capacity {}",
            non_root,
            image.max_files.min(limits.max_files)
        )));
    }

    let entries: Vec<(NodeId, Node)> = image
        .nodes
        .into_iter()
        .map(|record| {
            (
                record.id,
                Node {
                    name: record.name,
                    parent: record.parent,
                    permissions: record.permissions,
                    body: record.body,
                },
            )
        })
        .collect();
    let nodes = NodeStore::restore(limits.max_files + 1, &image.slot_generations, entries)?;

    let mut contents = Vec::with_capacity(image.contents.len());
    for record in image.contents {
        let data = hex::decode(&record.data)
            .map_err(|err| FsError::corrupt(format!("content {}: {}", record.id.0, err)))?;
        contents.push((
            record.id,
            ContentEntry {
                data,
                refcount: record.refcount,
            },
        ));
    }
    let contents = ContentStore::restore(image.next_content_id, contents)?;

    Tree::from_parts(
        limits.clone(),
        nodes,
        contents,
        image.root,
        image.current_directory,
    )
}

impl FsCore {
    /// Write the whole filesystem to the backing store, atomically.
    pub fn save_file_system(&mut self) -> FsResult<()> {
        let bytes = encode(&self.tree)?;
        if let Err(err) = self.backstore.write_atomic(&bytes) {
            warn!(store = %self.backstore.describe(), error = %err, "save failed; previous store kept");
            return Err(err);
        }
        self.dirty = false;
        info!(
            store = %self.backstore.describe(),
            nodes = self.tree.node_count(),
            bytes = bytes.len(),
            "filesystem saved"
        );
        Ok(())
    }

    /// Replace the in-memory tree with the backing store's contents.
    ///
    /// On failure the current tree, handles and directory are untouched.
    /// On success every open handle is dropped and the saved current
    /// directory is restored.
    pub fn load_file_system(&mut self) -> FsResult<()> {
        let bytes = self.backstore.read()?;
        let tree = match decode(&bytes, &self.config.limits) {
            Ok(tree) => tree,
            Err(err) => {
                warn!(store = %self.backstore.describe(), error = %err, "rejected store");
                return Err(err);
            }
        };
        if !self.handles.is_empty() {
            warn!(open_handles = self.handles.len(), "dropping open handles on load");
            self.handles.clear();
        }
        self.tree = tree;
        self.dirty = false;
        info!(
            store = %self.backstore.describe(),
            nodes = self.tree.node_count(),
            "filesystem loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fault::{FaultOp, FaultPolicy, FaultRule};
    use crate::{FsConfig, OpenMode};

    fn create_test_fs() -> FsCore {
        let mut fs = FsCore::new(FsConfig::in_memory()).unwrap();
        fs.create_directory("/a").unwrap();
        fs.create_file("/a/b.txt").unwrap();
        let h = fs.open_file("/a/b.txt", OpenMode::Write).unwrap();
        fs.write_file(h, b"payload").unwrap();
        fs.close_file(h).unwrap();
        fs.create_hard_link("/a/b.txt", "/a/c.txt").unwrap();
        fs.create_symbolic_link("b.txt", "/a/link").unwrap();
        fs
    }

    fn tamper(bytes: &[u8], edit: impl FnOnce(&mut StoreImage)) -> Vec<u8> {
        let mut file: StoreFile = serde_json::from_slice(bytes).unwrap();
        edit(&mut file.image);
        file.checksum = checksum(&file.image).unwrap();
        serde_json::to_vec(&file).unwrap()
    }

    #[test]
    fn test_encode_decode_preserves_identity() {
        let fs = create_test_fs();
        let bytes = encode(&fs.tree).unwrap();
        let tree = decode(&bytes, &fs.config.limits).unwrap();
        let b = fs.tree.resolve("/a/b.txt", true).unwrap();
        assert_eq!(tree.resolve("/a/b.txt", true).unwrap(), b);
        assert_eq!(tree.resolve("/a/link", true).unwrap(), b);
        assert_eq!(tree.info(b).unwrap(), fs.tree.info(b).unwrap());
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let fs = create_test_fs();
        let mut file: StoreFile = serde_json::from_slice(&encode(&fs.tree).unwrap()).unwrap();
        file.image.nodes[1].name = "renamed".to_string();
        let bytes = serde_json::to_vec(&file).unwrap();
        let err = decode(&bytes, &fs.config.limits).unwrap_err();
        assert!(matches!(err, FsError::CorruptStore(msg) if msg.contains("checksum")));
    }

    #[test]
    fn test_truncated_store_detected() {
        let fs = create_test_fs();
        let bytes = encode(&fs.tree).unwrap();
        let err = decode(&bytes[..bytes.len() / 2], &fs.config.limits).unwrap_err();
        assert!(matches!(err, FsError::CorruptStore(_)));
    }

    #[test]
    fn test_refcount_mismatch_detected() {
        let fs = create_test_fs();
        let bytes = tamper(&encode(&fs.tree).unwrap(), |image| {
            image.contents[0].refcount = 1;
        });
        assert!(matches!(
            decode(&bytes, &fs.config.limits),
            Err(FsError::CorruptStore(_))
        ));
    }

    #[test]
    fn test_duplicate_sibling_detected() {
        let fs = create_test_fs();
        let bytes = tamper(&encode(&fs.tree).unwrap(), |image| {
            for node in image.nodes.iter_mut() {
                if node.name == "c.txt" {
                    node.name = "b.txt".to_string();
                }
            }
        });
        assert!(matches!(
            decode(&bytes, &fs.config.limits),
            Err(FsError::CorruptStore(_))
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let fs = create_test_fs();
        let a = fs.tree.resolve("/a", true).unwrap();
        let bytes = tamper(&encode(&fs.tree).unwrap(), |image| {
            // Detach /a from the root and make it its own parent
            for node in image.nodes.iter_mut() {
                if let NodeBody::Directory { children } = &mut node.body {
                    children.retain(|&c| c != a);
                }
                if node.id == a {
                    node.parent = Some(a);
                    if let NodeBody::Directory { children } = &mut node.body {
                        children.push(a);
                    }
                }
            }
        });
        assert!(matches!(
            decode(&bytes, &fs.config.limits),
            Err(FsError::CorruptStore(_))
        ));
    }

    #[test]
    fn test_node_count_over_capacity_rejected() {
        let fs = create_test_fs();
        let bytes = encode(&fs.tree).unwrap();
        let small = FsLimits {
            max_files: 2,
            ..FsLimits::default()
        };
        assert!(matches!(decode(&bytes, &small), Err(FsError::CorruptStore(_))));

        let bytes = tamper(&bytes, |image| image.node_count += 1);
        assert!(matches!(
            decode(&bytes, &fs.config.limits),
            Err(FsError::CorruptStore(_))
        ));
    }

    #[test]
    fn test_save_load_round_trip_in_memory() {
        let mut fs = create_test_fs();
        fs.change_directory("/a").unwrap();
        fs.save_file_system().unwrap();
        assert!(!fs.is_dirty());

        fs.change_directory("/").unwrap();
        fs.delete_file("/a/link").unwrap();
        fs.load_file_system().unwrap();
        assert_eq!(fs.get_current_path().unwrap(), "/a");
        assert_eq!(fs.list_files(".").unwrap(), vec!["b.txt", "c.txt", "link"]);
    }

    #[test]
    fn test_load_drops_handles() {
        let mut fs = create_test_fs();
        fs.save_file_system().unwrap();
        let h = fs.open_file("/a/b.txt", OpenMode::Read).unwrap();
        fs.load_file_system().unwrap();
        assert!(matches!(fs.read_file(h), Err(FsError::InvalidHandle)));
    }

    #[test]
    fn test_failed_save_keeps_previous_store() {
        let mut fs = create_test_fs();
        fs.save_file_system().unwrap();
        fs.create_file("/unsaved").unwrap();
        fs.fault_injector()
            .set_policy(FaultPolicy::single(FaultRule::always(FaultOp::StoreWrite)));
        assert!(matches!(fs.save_file_system(), Err(FsError::Io(_))));
        assert!(fs.is_dirty());
        fs.fault_injector().clear();

        fs.load_file_system().unwrap();
        assert!(matches!(fs.get_file_by_path("/unsaved"), Err(FsError::NotFound)));
    }

    #[test]
    fn test_failed_load_keeps_tree() {
        let mut fs = create_test_fs();
        fs.save_file_system().unwrap();
        fs.create_file("/kept").unwrap();
        fs.fault_injector()
            .set_policy(FaultPolicy::single(FaultRule::always(FaultOp::StoreRead)));
        assert!(fs.load_file_system().is_err());
        assert!(fs.get_file_by_path("/kept").is_ok());
        assert!(fs.is_dirty());
    }
}
