// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Directory tree: node records, path resolution and structural invariants

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::config::FsLimits;
use crate::error::{FsError, FsResult};
use crate::storage::ContentStore;
use crate::store::NodeStore;
use crate::types::{ContentId, LinkKind, NodeId, NodeInfo, NodeKind, Permissions};

/// Payload carried by a node
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum NodeBody {
    /// Regular file entry; hard links are separate entries sharing `content`
    File { content: ContentId },
    Directory { children: Vec<NodeId> },
    Symlink { target: String },
}

/// Node record stored in the arena
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) name: String,
    pub(crate) parent: Option<NodeId>,
    pub(crate) permissions: Permissions,
    pub(crate) body: NodeBody,
}

impl Node {
    pub(crate) fn is_dir(&self) -> bool {
        matches!(self.body, NodeBody::Directory { .. })
    }
}

/// The in-memory tree: node arena, content store, root and current directory.
#[derive(Clone, Debug)]
pub(crate) struct Tree {
    limits: FsLimits,
    nodes: NodeStore<Node>,
    contents: ContentStore,
    root: NodeId,
    cwd: NodeId,
}

impl Tree {
    pub(crate) fn new(limits: FsLimits, root_permissions: Permissions) -> FsResult<Self> {
        // The root takes a reserved slot on top of `max_files`
        let mut nodes = NodeStore::with_capacity(limits.max_files + 1);
        let root = nodes.allocate(Node {
            name: String::new(),
            parent: None,
            permissions: root_permissions,
            body: NodeBody::Directory {
                children: Vec::new(),
            },
        })?;
        Ok(Self {
            limits,
            nodes,
            contents: ContentStore::new(),
            root,
            cwd: root,
        })
    }

    /// Assemble a tree from restored parts, checking every structural invariant.
    pub(crate) fn from_parts(
        limits: FsLimits,
        nodes: NodeStore<Node>,
        contents: ContentStore,
        root: NodeId,
        cwd: NodeId,
    ) -> FsResult<Self> {
        let tree = Self {
            limits,
            nodes,
            contents,
            root,
            cwd,
        };
        tree.validate()?;
        Ok(tree)
    }

    pub(crate) fn limits(&self) -> &FsLimits {
        &self.limits
    }

    pub(crate) fn root(&self) -> NodeId {
        self.root
    }

    pub(crate) fn cwd(&self) -> NodeId {
        self.cwd
    }

    pub(crate) fn set_cwd(&mut self, id: NodeId) {
        self.cwd = id;
    }

    pub(crate) fn nodes(&self) -> &NodeStore<Node> {
        &self.nodes
    }

    pub(crate) fn contents(&self) -> &ContentStore {
        &self.contents
    }

    pub(crate) fn contents_mut(&mut self) -> &mut ContentStore {
        &mut self.contents
    }

    pub(crate) fn node(&self, id: NodeId) -> FsResult<&Node> {
        self.nodes.get(id)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> FsResult<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Live nodes excluding the root.
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Node capacity excluding the root's reserved slot.
    pub(crate) fn capacity(&self) -> usize {
        self.nodes.capacity() - 1
    }

    pub(crate) fn free_slots(&self) -> usize {
        self.nodes.free_count()
    }

    pub(crate) fn children(&self, dir: NodeId) -> FsResult<&[NodeId]> {
        match &self.node(dir)?.body {
            NodeBody::Directory { children } => Ok(children),
            _ => Err(FsError::NotADirectory),
        }
    }

    pub(crate) fn find_child(&self, dir: NodeId, name: &str) -> FsResult<Option<NodeId>> {
        for &child in self.children(dir)? {
            if self.node(child)?.name == name {
                return Ok(Some(child));
            }
        }
        Ok(None)
    }

    pub(crate) fn check_path_input(&self, path: &str) -> FsResult<()> {
        if path.is_empty() {
            return Err(FsError::InvalidArgument);
        }
        if path.len() > self.limits.max_path_length {
            return Err(FsError::PathTooLong);
        }
        Ok(())
    }

    pub(crate) fn validate_name(&self, name: &str) -> FsResult<()> {
        if name.is_empty() || name == "." || name == ".." || name.contains('/') {
            return Err(FsError::InvalidName);
        }
        if name.len() > self.limits.max_name_length {
            return Err(FsError::NameTooLong);
        }
        Ok(())
    }

    /// Resolve `path` to a node.
    ///
    /// Absolute paths start at the root, relative ones at the current
    /// directory. Symbolic links on intermediate components are always
    /// followed; the final component is followed only when `follow_final`.
    pub(crate) fn resolve(&self, path: &str, follow_final: bool) -> FsResult<NodeId> {
        self.check_path_input(path)?;
        let mut hops = 0;
        self.resolve_from(self.cwd, path, follow_final, &mut hops)
    }

    fn resolve_from(
        &self,
        base: NodeId,
        path: &str,
        follow_final: bool,
        hops: &mut usize,
    ) -> FsResult<NodeId> {
        let mut current = if path.starts_with('/') { self.root } else { base };
        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();

        for (i, component) in components.iter().enumerate() {
            let is_last = i + 1 == components.len();
            let node = self.node(current)?;
            if !node.is_dir() {
                return Err(FsError::NotADirectory);
            }
            match *component {
                "." => {}
                ".." => current = node.parent.unwrap_or(current),
                name => {
                    let child = self.find_child(current, name)?.ok_or(FsError::NotFound)?;
                    current = if !is_last || follow_final {
                        self.follow(child, hops)?
                    } else {
                        child
                    };
                }
            }
        }
        Ok(current)
    }

    /// Follow `id` through symbolic links until a non-link node is reached.
    fn follow(&self, id: NodeId, hops: &mut usize) -> FsResult<NodeId> {
        let node = self.node(id)?;
        match &node.body {
            NodeBody::Symlink { target } => {
                *hops += 1;
                if *hops > self.limits.max_symlink_hops {
                    return Err(FsError::CyclicLink);
                }
                let base = node.parent.unwrap_or(self.root);
                self.resolve_from(base, target, true, hops)
            }
            _ => Ok(id),
        }
    }

    /// Split a creation path into its parent directory and the new entry name.
    pub(crate) fn resolve_parent(&self, path: &str) -> FsResult<(NodeId, String)> {
        self.check_path_input(path)?;
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            // "/" names the root itself
            return Err(FsError::AlreadyExists);
        }
        let (dir, name) = match trimmed.rfind('/') {
            Some(0) => ("/", &trimmed[1..]),
            Some(pos) => (&trimmed[..pos], &trimmed[pos + 1..]),
            None => (".", trimmed),
        };
        self.validate_name(name)?;
        let mut hops = 0;
        let parent = self.resolve_from(self.cwd, dir, true, &mut hops)?;
        if !self.node(parent)?.is_dir() {
            return Err(FsError::NotADirectory);
        }
        Ok((parent, name.to_string()))
    }

    /// Byte length of the absolute path of `id` ("/" counts as zero).
    pub(crate) fn path_len(&self, id: NodeId) -> FsResult<usize> {
        let mut len = 0;
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            len += 1 + self.node(current)?.name.len();
            current = parent;
        }
        Ok(len)
    }

    /// Longest path suffix any descendant adds below `id`.
    pub(crate) fn subtree_max_suffix(&self, id: NodeId) -> FsResult<usize> {
        let mut longest = 0;
        if let NodeBody::Directory { children } = &self.node(id)?.body {
            for &child in children {
                let suffix = 1 + self.node(child)?.name.len() + self.subtree_max_suffix(child)?;
                longest = longest.max(suffix);
            }
        }
        Ok(longest)
    }

    /// Number of nodes in the subtree rooted at `id`, including `id`.
    pub(crate) fn subtree_size(&self, id: NodeId) -> FsResult<usize> {
        let mut size = 1;
        if let NodeBody::Directory { children } = &self.node(id)?.body {
            for &child in children {
                size += self.subtree_size(child)?;
            }
        }
        Ok(size)
    }

    pub(crate) fn is_ancestor_or_self(&self, ancestor: NodeId, id: NodeId) -> FsResult<bool> {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return Ok(true);
            }
            current = self.node(node)?.parent;
        }
        Ok(false)
    }

    /// Fail `PathTooLong` unless an entry `name` under `parent`, plus a
    /// subtree reaching `suffix` bytes deeper, stays within the path limit.
    pub(crate) fn check_fits(&self, parent: NodeId, name: &str, suffix: usize) -> FsResult<()> {
        let parent_len = self.path_len(parent)?;
        if parent_len + 1 + name.len() + suffix > self.limits.max_path_length {
            return Err(FsError::PathTooLong);
        }
        Ok(())
    }

    pub(crate) fn absolute_path(&self, id: NodeId) -> FsResult<String> {
        let mut names = Vec::new();
        let mut current = id;
        while let Some(parent) = self.node(current)?.parent {
            names.push(self.node(current)?.name.as_str());
            current = parent;
        }
        if names.is_empty() {
            return Ok("/".to_string());
        }
        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }

    /// Create a new entry under `parent`. Nothing changes on failure.
    pub(crate) fn insert_child(
        &mut self,
        parent: NodeId,
        name: &str,
        permissions: Permissions,
        body: NodeBody,
    ) -> FsResult<NodeId> {
        if self.find_child(parent, name)?.is_some() {
            return Err(FsError::AlreadyExists);
        }
        self.check_fits(parent, name, 0)?;
        let id = self.nodes.allocate(Node {
            name: name.to_string(),
            parent: Some(parent),
            permissions,
            body,
        })?;
        if let NodeBody::Directory { children } = &mut self.nodes.get_mut(parent)?.body {
            children.push(id);
        }
        Ok(id)
    }

    /// Unlink `id` from its parent's children without freeing it.
    pub(crate) fn detach(&mut self, id: NodeId) -> FsResult<()> {
        let parent = self.node(id)?.parent.ok_or(FsError::InvalidArgument)?;
        if let NodeBody::Directory { children } = &mut self.nodes.get_mut(parent)?.body {
            children.retain(|&child| child != id);
        }
        Ok(())
    }

    /// Link a detached node under `parent` as `name`.
    pub(crate) fn attach(&mut self, id: NodeId, parent: NodeId, name: &str) -> FsResult<()> {
        {
            let node = self.nodes.get_mut(id)?;
            node.name = name.to_string();
            node.parent = Some(parent);
        }
        match &mut self.nodes.get_mut(parent)?.body {
            NodeBody::Directory { children } => {
                children.push(id);
                Ok(())
            }
            _ => Err(FsError::NotADirectory),
        }
    }

    /// Free a detached leaf node, dropping its content reference.
    pub(crate) fn release(&mut self, id: NodeId) -> FsResult<Node> {
        let node = self.nodes.free(id)?;
        if let NodeBody::File { content } = node.body {
            self.contents.decrement_refcount(content);
        }
        Ok(node)
    }

    /// File entries sharing `content`.
    pub(crate) fn aliases_of(&self, content: ContentId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.body == NodeBody::File { content })
            .map(|(id, _)| id)
            .collect()
    }

    pub(crate) fn info(&self, id: NodeId) -> FsResult<NodeInfo> {
        let node = self.node(id)?;
        let (kind, link, size, refcount) = match &node.body {
            NodeBody::Directory { .. } => (NodeKind::Directory, LinkKind::None, 0, 0),
            NodeBody::Symlink { target } => (
                NodeKind::File,
                LinkKind::Symbolic(target.clone()),
                target.len() as u64,
                0,
            ),
            NodeBody::File { content } => {
                let refcount = self.contents.refcount(*content);
                let link = if refcount > 1 {
                    LinkKind::HardAlias(*content)
                } else {
                    LinkKind::None
                };
                (NodeKind::File, link, self.contents.len_of(*content), refcount)
            }
        };
        Ok(NodeInfo {
            id,
            name: node.name.clone(),
            kind,
            link,
            permissions: node.permissions,
            size,
            refcount,
        })
    }

    /// Check every structural invariant of the tree.
    ///
    /// Used on load, where the tree comes from outside and cannot be trusted.
    pub(crate) fn validate(&self) -> FsResult<()> {
        let root = self
            .node(self.root)
            .map_err(|_| FsError::corrupt("root directory missing"))?;
        if root.parent.is_some() || !root.is_dir() || !root.name.is_empty() {
            return Err(FsError::corrupt("root is not a parentless directory"));
        }
        if self.node_count() > self.limits.max_files {
            return Err(FsError::corrupt("node count exceeds capacity"));
        }

        let mut visited = HashSet::new();
        let mut content_refs: HashMap<ContentId, usize> = HashMap::new();
        let mut stack = vec![self.root];
        visited.insert(self.root);

        while let Some(id) = stack.pop() {
            let node = self.node(id)?;
            match &node.body {
                NodeBody::Directory { children } => {
                    let mut names = HashSet::new();
                    for &child in children {
                        let child_node = self
                            .node(child)
                            .map_err(|_| FsError::corrupt(format!("dangling child {}", child)))?;
                        if child_node.parent != Some(id) {
                            return Err(FsError::corrupt(format!(
                                "node {} does not name its directory as parent",
                                child
                            )));
                        }
                        if !visited.insert(child) {
                            return Err(FsError::corrupt(format!("node {} linked twice", child)));
                        }
                        if !names.insert(child_node.name.as_str()) {
                            return Err(FsError::corrupt(format!(
                                "duplicate name {:?} in one directory",
                                child_node.name
                            )));
                        }
                        self.validate_name(&child_node.name).map_err(|_| {
                            FsError::corrupt(format!("invalid name {:?}", child_node.name))
                        })?;
                        stack.push(child);
                    }
                }
                NodeBody::File { content } => {
                    if !self.contents.contains(*content) {
                        return Err(FsError::corrupt(format!(
                            "node {} references missing content",
                            id
                        )));
                    }
                    *content_refs.entry(*content).or_insert(0) += 1;
                }
                NodeBody::Symlink { target } => {
                    if target.is_empty() || target.len() > self.limits.max_path_length {
                        return Err(FsError::corrupt(format!("node {} has a bad link target", id)));
                    }
                }
            }
            if self.path_len(id)? > self.limits.max_path_length {
                return Err(FsError::corrupt(format!("node {} path too long", id)));
            }
        }

        // Anything not reached from the root is either orphaned or part of a cycle
        if visited.len() != self.nodes.len() {
            return Err(FsError::corrupt("unreachable nodes in tree"));
        }

        for (content, entry) in self.contents.iter() {
            let refs = content_refs.get(&content).copied().unwrap_or(0);
            if refs != entry.refcount {
                return Err(FsError::corrupt(format!(
                    "content {} refcount {} but {} entries",
                    content.0, entry.refcount, refs
                )));
            }
        }

        if !self.node(self.cwd).map(Node::is_dir).unwrap_or(false) {
            return Err(FsError::corrupt("current directory is not a directory"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tree() -> Tree {
        Tree::new(FsLimits::default(), Permissions::Both).unwrap()
    }

    fn mkdir(tree: &mut Tree, path: &str) -> NodeId {
        let (parent, name) = tree.resolve_parent(path).unwrap();
        tree.insert_child(
            parent,
            &name,
            Permissions::Both,
            NodeBody::Directory {
                children: Vec::new(),
            },
        )
        .unwrap()
    }

    fn symlink(tree: &mut Tree, path: &str, target: &str) -> NodeId {
        let (parent, name) = tree.resolve_parent(path).unwrap();
        tree.insert_child(
            parent,
            &name,
            Permissions::Both,
            NodeBody::Symlink {
                target: target.to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn resolves_dot_and_dotdot() {
        let mut tree = create_test_tree();
        let a = mkdir(&mut tree, "/a");
        let b = mkdir(&mut tree, "/a/b");
        assert_eq!(tree.resolve("/a/./b", true).unwrap(), b);
        assert_eq!(tree.resolve("/a/b/..", true).unwrap(), a);
        assert_eq!(tree.resolve("/..", true).unwrap(), tree.root());
        assert_eq!(tree.resolve("//a//b/", true).unwrap(), b);
    }

    #[test]
    fn relative_paths_start_at_cwd() {
        let mut tree = create_test_tree();
        let a = mkdir(&mut tree, "/a");
        let b = mkdir(&mut tree, "/a/b");
        tree.set_cwd(a);
        assert_eq!(tree.resolve("b", true).unwrap(), b);
        assert_eq!(tree.resolve("..", true).unwrap(), tree.root());
        assert_eq!(tree.absolute_path(b).unwrap(), "/a/b");
    }

    #[test]
    fn empty_path_is_rejected() {
        let tree = create_test_tree();
        assert!(matches!(tree.resolve("", true), Err(FsError::InvalidArgument)));
    }

    #[test]
    fn relative_symlink_resolves_against_its_directory() {
        let mut tree = create_test_tree();
        mkdir(&mut tree, "/a");
        let target = mkdir(&mut tree, "/a/real");
        let link = symlink(&mut tree, "/a/alias", "real");
        assert_eq!(tree.resolve("/a/alias", true).unwrap(), target);
        assert_eq!(tree.resolve("/a/alias", false).unwrap(), link);
        let inner = mkdir(&mut tree, "/a/alias/inner");
        assert_eq!(tree.absolute_path(inner).unwrap(), "/a/real/inner");
    }

    #[test]
    fn symlink_cycle_is_detected() {
        let mut tree = create_test_tree();
        symlink(&mut tree, "/x", "/y");
        symlink(&mut tree, "/y", "/x");
        assert!(matches!(tree.resolve("/x", true), Err(FsError::CyclicLink)));
        assert!(tree.resolve("/x", false).is_ok());
    }

    #[test]
    fn file_in_middle_of_path_is_not_a_directory() {
        let mut tree = create_test_tree();
        let content = tree.contents_mut().allocate(b"");
        let root = tree.root();
        tree.insert_child(root, "f", Permissions::Both, NodeBody::File { content })
            .unwrap();
        assert!(matches!(tree.resolve("/f/x", true), Err(FsError::NotADirectory)));
        assert!(matches!(tree.resolve_parent("/f/x"), Err(FsError::NotADirectory)));
    }

    #[test]
    fn name_validation() {
        let tree = create_test_tree();
        assert!(matches!(tree.validate_name(".."), Err(FsError::InvalidName)));
        assert!(matches!(tree.validate_name(""), Err(FsError::InvalidName)));
        let long = "n".repeat(tree.limits().max_name_length + 1);
        assert!(matches!(tree.validate_name(&long), Err(FsError::NameTooLong)));
        assert!(matches!(tree.resolve_parent("/a/."), Err(FsError::InvalidName)));
        assert!(matches!(tree.resolve_parent("/"), Err(FsError::AlreadyExists)));
    }

    #[test]
    fn path_length_is_bounded() {
        let limits = FsLimits {
            max_path_length: 8,
            ..FsLimits::default()
        };
        let mut tree = Tree::new(limits, Permissions::Both).unwrap();
        let abc = mkdir(&mut tree, "/abc");
        // "/abc/def" is exactly 8 bytes
        let def = mkdir(&mut tree, "/abc/def");
        assert_eq!(tree.path_len(def).unwrap(), 8);
        tree.set_cwd(abc);
        let (parent, name) = tree.resolve_parent("defg").unwrap();
        let err = tree
            .insert_child(
                parent,
                &name,
                Permissions::Both,
                NodeBody::Directory {
                    children: Vec::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, FsError::PathTooLong));
        assert_eq!(tree.subtree_max_suffix(abc).unwrap(), 4);
    }

    #[test]
    fn validate_accepts_fresh_tree_and_catches_refcount_drift() {
        let mut tree = create_test_tree();
        mkdir(&mut tree, "/a");
        let content = tree.contents_mut().allocate(b"x");
        let root = tree.root();
        tree.insert_child(root, "f", Permissions::Both, NodeBody::File { content })
            .unwrap();
        tree.validate().unwrap();

        tree.contents_mut().increment_refcount(content).unwrap();
        assert!(matches!(tree.validate(), Err(FsError::CorruptStore(_))));
    }

    #[test]
    fn ancestry_checks() {
        let mut tree = create_test_tree();
        let a = mkdir(&mut tree, "/a");
        let sub = mkdir(&mut tree, "/a/sub");
        assert!(tree.is_ancestor_or_self(a, sub).unwrap());
        assert!(tree.is_ancestor_or_self(a, a).unwrap());
        assert!(!tree.is_ancestor_or_self(sub, a).unwrap());
        assert_eq!(tree.subtree_size(a).unwrap(), 2);
    }
}
