/// Scene-graph adapter.
///
/// Scene objects are keyed by an opaque [`SceneId`] that never changes, so
/// a rename or reparent keeps every identity and only the display name or
/// the parent differs. Per-kind behaviour comes from a function-pointer
/// table ([`SceneKind::caps`]) rather than one type per kind.
use compact_str::CompactString;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use treesync_core::{Element, Identity, NodeKind, Source, SourceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(pub u64);

impl Identity for SceneId {}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneKind {
    /// Plain grouping node.
    Node,
    /// Renderable mesh; may carry attached lights.
    Geometry,
    Light,
    /// UI element; only other controls nest under it.
    Control,
}

/// Capability table entry for one [`SceneKind`].
#[derive(Debug)]
pub struct SceneCaps {
    pub container: bool,
    pub can_move: bool,
    pub can_copy: bool,
    pub accepts: fn(candidate: SceneKind, is_copy: bool) -> bool,
}

static NODE_CAPS: SceneCaps = SceneCaps {
    container: true,
    can_move: true,
    can_copy: true,
    accepts: |_, _| true,
};

static GEOMETRY_CAPS: SceneCaps = SceneCaps {
    container: false,
    can_move: true,
    can_copy: true,
    accepts: |candidate, _| candidate == SceneKind::Light,
};

static LIGHT_CAPS: SceneCaps = SceneCaps {
    container: false,
    can_move: true,
    can_copy: true,
    accepts: |_, _| false,
};

static CONTROL_CAPS: SceneCaps = SceneCaps {
    container: true,
    can_move: true,
    can_copy: false,
    accepts: |candidate, _| candidate == SceneKind::Control,
};

impl SceneKind {
    pub fn caps(self) -> &'static SceneCaps {
        match self {
            Self::Node => &NODE_CAPS,
            Self::Geometry => &GEOMETRY_CAPS,
            Self::Light => &LIGHT_CAPS,
            Self::Control => &CONTROL_CAPS,
        }
    }

    pub fn node_kind(self) -> NodeKind {
        if self.caps().container {
            NodeKind::Container
        } else {
            NodeKind::Leaf
        }
    }
}

#[derive(Debug, Clone)]
struct SceneObject {
    name: CompactString,
    kind: SceneKind,
    parent: Option<SceneId>,
    children: Vec<SceneId>,
}

/// The scene graph itself. Child order is insertion order.
#[derive(Debug)]
pub struct SceneGraph {
    objects: HashMap<SceneId, SceneObject>,
    root: SceneId,
    next_id: u64,
}

/// A scene graph shared between the editor and any number of views.
pub type SharedScene = Arc<RwLock<SceneGraph>>;

impl SceneGraph {
    pub fn new(root_name: &str) -> Self {
        let root = SceneId(0);
        let mut objects = HashMap::new();
        objects.insert(
            root,
            SceneObject {
                name: CompactString::new(root_name),
                kind: SceneKind::Node,
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            objects,
            root,
            next_id: 1,
        }
    }

    pub fn shared(root_name: &str) -> SharedScene {
        Arc::new(RwLock::new(Self::new(root_name)))
    }

    pub fn root(&self) -> SceneId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: SceneId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn name(&self, id: SceneId) -> Option<&str> {
        self.objects.get(&id).map(|o| o.name.as_str())
    }

    pub fn kind(&self, id: SceneId) -> Option<SceneKind> {
        self.objects.get(&id).map(|o| o.kind)
    }

    pub fn parent(&self, id: SceneId) -> Option<SceneId> {
        self.objects.get(&id).and_then(|o| o.parent)
    }

    pub fn children(&self, id: SceneId) -> &[SceneId] {
        self.objects.get(&id).map_or(&[], |o| o.children.as_slice())
    }

    /// Position of `id` among its parent's children.
    pub fn index_of(&self, id: SceneId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&c| c == id)
    }

    /// `true` if `id` is `ancestor` or lies below it.
    pub fn is_within(&self, id: SceneId, ancestor: SceneId) -> bool {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    /// Append a new object under `parent`. `None` if `parent` does not exist.
    pub fn attach(&mut self, parent: SceneId, name: &str, kind: SceneKind) -> Option<SceneId> {
        let id = SceneId(self.next_id);
        self.objects.get_mut(&parent)?.children.push(id);
        self.next_id += 1;
        self.objects.insert(
            id,
            SceneObject {
                name: CompactString::new(name),
                kind,
                parent: Some(parent),
                children: Vec::new(),
            },
        );
        Some(id)
    }

    /// Remove `id` and everything below it. The root cannot be detached.
    pub fn detach(&mut self, id: SceneId) -> bool {
        if id == self.root || !self.contains(id) {
            return false;
        }
        self.unlink(id);
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(obj) = self.objects.remove(&current) {
                stack.extend(obj.children);
            }
        }
        true
    }

    /// Move `id` to the end of `new_parent`'s children.
    pub fn reparent(&mut self, id: SceneId, new_parent: SceneId) -> bool {
        if id == self.root
            || !self.contains(id)
            || !self.contains(new_parent)
            || self.is_within(new_parent, id)
        {
            return false;
        }
        self.unlink(id);
        if let Some(parent) = self.objects.get_mut(&new_parent) {
            parent.children.push(id);
        }
        if let Some(obj) = self.objects.get_mut(&id) {
            obj.parent = Some(new_parent);
        }
        true
    }

    pub fn rename(&mut self, id: SceneId, name: &str) -> bool {
        match self.objects.get_mut(&id) {
            Some(obj) => {
                obj.name = CompactString::new(name);
                true
            }
            None => false,
        }
    }

    /// Change the kind of `id` in place (e.g. converting a node to geometry).
    pub fn set_kind(&mut self, id: SceneId, kind: SceneKind) -> bool {
        match self.objects.get_mut(&id) {
            Some(obj) => {
                obj.kind = kind;
                true
            }
            None => false,
        }
    }

    /// Deep-copy `id` under `new_parent` with fresh identities.
    pub fn duplicate(&mut self, id: SceneId, new_parent: SceneId) -> Option<SceneId> {
        if !self.contains(new_parent) || self.is_within(new_parent, id) {
            return None;
        }
        let src = self.objects.get(&id)?.clone();
        let copy = self.attach(new_parent, &src.name, src.kind)?;
        let mut stack: Vec<(SceneId, SceneId)> = src.children.iter().map(|&c| (c, copy)).collect();
        while let Some((original, parent)) = stack.pop() {
            let Some(obj) = self.objects.get(&original).cloned() else {
                continue;
            };
            if let Some(child) = self.attach(parent, &obj.name, obj.kind) {
                stack.extend(obj.children.iter().map(|&c| (c, child)));
            }
        }
        Some(copy)
    }

    fn unlink(&mut self, id: SceneId) {
        let parent = self.objects.get(&id).and_then(|o| o.parent);
        if let Some(parent) = parent.and_then(|p| self.objects.get_mut(&p)) {
            parent.children.retain(|&c| c != id);
        }
        if let Some(obj) = self.objects.get_mut(&id) {
            obj.parent = None;
        }
    }
}

/// Handle to one scene object. Name and kind are captured when the handle
/// is made; the engine asks for a fresh handle after a rename.
#[derive(Clone)]
pub struct SceneHandle {
    pub id: SceneId,
    pub kind: SceneKind,
    pub name: CompactString,
    scene: SharedScene,
}

impl fmt::Debug for SceneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .finish()
    }
}

impl SceneHandle {
    /// Handle for `id`, or `None` if it is not in `scene`.
    pub fn new(scene: &SharedScene, id: SceneId) -> Option<Self> {
        let graph = scene.read();
        Some(Self {
            id,
            kind: graph.kind(id)?,
            name: CompactString::new(graph.name(id)?),
            scene: Arc::clone(scene),
        })
    }

    fn is_root(&self) -> bool {
        self.scene.read().root() == self.id
    }
}

impl Element for SceneHandle {
    type Id = SceneId;

    fn identity(&self) -> SceneId {
        self.id
    }

    fn display_name(&self) -> CompactString {
        self.name.clone()
    }

    fn kind(&self) -> NodeKind {
        self.kind.node_kind()
    }

    fn read_children(&self) -> Result<Vec<Self>, SourceError> {
        let graph = self.scene.read();
        if !graph.contains(self.id) {
            return Err(SourceError::NotFound(self.id.to_string()));
        }
        Ok(graph
            .children(self.id)
            .iter()
            .filter_map(|&c| {
                Some(SceneHandle {
                    id: c,
                    kind: graph.kind(c)?,
                    name: CompactString::new(graph.name(c)?),
                    scene: Arc::clone(&self.scene),
                })
            })
            .collect())
    }

    fn can_move(&self) -> bool {
        self.kind.caps().can_move && !self.is_root()
    }

    fn can_copy(&self) -> bool {
        self.kind.caps().can_copy && !self.is_root()
    }

    fn can_accept(&self, candidate: &Self, is_copy: bool) -> bool {
        (self.kind.caps().accepts)(candidate.kind, is_copy)
    }

    fn accept(&self, candidate: &Self, is_copy: bool) -> Result<Option<SceneId>, SourceError> {
        let mut graph = self.scene.write();
        if !graph.contains(candidate.id) {
            return Err(SourceError::NotFound(candidate.id.to_string()));
        }
        let result = if is_copy {
            graph.duplicate(candidate.id, self.id)
        } else if graph.reparent(candidate.id, self.id) {
            Some(candidate.id)
        } else {
            None
        };
        match result {
            Some(id) => {
                debug!(candidate = %candidate.id, target = %self.id, copy = is_copy, "scene transfer");
                Ok(Some(id))
            }
            None => Err(SourceError::Rejected(format!(
                "{} cannot take {}",
                self.name, candidate.name
            ))),
        }
    }

    fn relocated(&self, id: &SceneId) -> Self {
        SceneHandle::new(&self.scene, *id).unwrap_or_else(|| Self {
            id: *id,
            ..self.clone()
        })
    }
}

/// Source over a [`SharedScene`].
#[derive(Clone)]
pub struct SceneSource {
    scene: SharedScene,
}

impl SceneSource {
    pub fn new(scene: SharedScene) -> Self {
        Self { scene }
    }

    pub fn scene(&self) -> &SharedScene {
        &self.scene
    }
}

impl Source for SceneSource {
    type Element = SceneHandle;

    fn root(&self) -> Result<SceneHandle, SourceError> {
        let root = self.scene.read().root();
        SceneHandle::new(&self.scene, root).ok_or_else(|| SourceError::NotFound(root.to_string()))
    }

    fn resolve(&self, id: &SceneId) -> Option<SceneHandle> {
        SceneHandle::new(&self.scene, *id)
    }

    fn parent_of(&self, id: &SceneId) -> Option<SceneId> {
        self.scene.read().parent(*id)
    }
}
