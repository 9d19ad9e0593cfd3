use std::collections::HashMap;

use crate::Animation;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Setup-pose data for one bone in the transform hierarchy.
///
/// Bones are owned by the skeleton; `parent` is a non-owning back-reference
/// by index into [`SkeletonData::bones`].
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoneData {
    pub name: String,
    pub parent: Option<usize>,
    pub length: f32,
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation: f32,
    pub flip_x: bool,
    pub flip_y: bool,
    pub inherit_scale: bool,
    pub inherit_rotation: bool,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IkConstraintData {
    pub name: String,
    /// Constrained bones, by index into [`SkeletonData::bones`].
    pub bones: Vec<usize>,
    /// Target bone, by index into [`SkeletonData::bones`].
    pub target: usize,
    /// Blend between setup pose and IK solution, in `[0, 1]`.
    pub mix: f32,
    /// ±1 elbow/knee bend sign.
    pub bend_direction: i8,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SlotData {
    pub name: String,
    /// Owning bone, by index into [`SkeletonData::bones`].
    pub bone: usize,
    /// Setup tint, RGBA in `[0, 1]`.
    pub color: [f32; 4],
    /// Setup attachment name, if any.
    pub attachment: Option<String>,
    pub additive_blending: bool,
}

/// Named event template stored once at skeleton level. Keyed event instances
/// copy or override these defaults.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventData {
    pub name: String,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: Option<String>,
}

/// One bone's influence on a weighted mesh vertex. `x`/`y` are the vertex
/// position in the bone's coordinate space.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VertexWeight {
    pub bone: usize,
    pub x: f32,
    pub y: f32,
    pub weight: f32,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RegionAttachment {
    pub name: String,
    pub path: String,
    pub x: f32,
    pub y: f32,
    pub scale_x: f32,
    pub scale_y: f32,
    pub rotation: f32,
    pub width: f32,
    pub height: f32,
    pub color: [f32; 4],
    /// Corner coordinates `[x1, y1, x2, y2, x3, y3, x4, y4]` in bone space,
    /// precomputed from position/scale/rotation/size so the runtime does not
    /// recompute the transform per frame. See [`Self::update_offset`].
    pub offset: [f32; 8],
}

impl RegionAttachment {
    /// Recompute the four corner coordinates from the local transform. The
    /// corner order is bottom-left, top-left, top-right, bottom-right.
    pub fn update_offset(&mut self) {
        let local_x = -self.width / 2.0 * self.scale_x;
        let local_y = -self.height / 2.0 * self.scale_y;
        let local_x2 = self.width / 2.0 * self.scale_x;
        let local_y2 = self.height / 2.0 * self.scale_y;
        let radians = self.rotation.to_radians();
        let cos = radians.cos();
        let sin = radians.sin();
        let local_x_cos = local_x * cos + self.x;
        let local_x_sin = local_x * sin;
        let local_y_cos = local_y * cos + self.y;
        let local_y_sin = local_y * sin;
        let local_x2_cos = local_x2 * cos + self.x;
        let local_x2_sin = local_x2 * sin;
        let local_y2_cos = local_y2 * cos + self.y;
        let local_y2_sin = local_y2 * sin;
        self.offset = [
            local_x_cos - local_y_sin,
            local_y_cos + local_x_sin,
            local_x_cos - local_y2_sin,
            local_y2_cos + local_x_sin,
            local_x2_cos - local_y2_sin,
            local_y2_cos + local_x2_sin,
            local_x2_cos - local_y_sin,
            local_y_cos + local_x2_sin,
        ];
    }
}

/// Polygon hit area: flat `[x, y, x, y, …]` vertex coordinates.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoundingBoxAttachment {
    pub name: String,
    pub vertices: Vec<f32>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MeshAttachment {
    pub name: String,
    pub path: String,
    /// Texture coordinates within the region, flat `[u, v, …]`, one pair per
    /// vertex. Unscaled; remapping into an atlas page is the renderer's job.
    pub region_uvs: Vec<f32>,
    /// Triangle list indexing vertices (stored as 16-bit in the file).
    pub triangles: Vec<u32>,
    /// Rest-pose vertex coordinates, flat `[x, y, …]`.
    pub vertices: Vec<f32>,
    pub color: [f32; 4],
    /// Number of vertex *coordinates* forming the outer silhouette (the file
    /// stores a vertex-pair count; it is doubled on read).
    pub hull_length: usize,
    /// Only present when the export carries nonessential data.
    pub edges: Vec<i32>,
    pub width: f32,
    pub height: f32,
}

impl MeshAttachment {
    /// Length of an FFD frame's vertex array targeting this mesh.
    pub fn world_coordinate_count(&self) -> usize {
        self.vertices.len()
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SkinnedMeshAttachment {
    pub name: String,
    pub path: String,
    pub region_uvs: Vec<f32>,
    pub triangles: Vec<u32>,
    /// Bone influences, one list per final vertex. Variable fan-out: each
    /// vertex may be weighted to a different number of bones.
    pub weights: Vec<Vec<VertexWeight>>,
    pub color: [f32; 4],
    pub hull_length: usize,
    pub edges: Vec<i32>,
    pub width: f32,
    pub height: f32,
}

impl SkinnedMeshAttachment {
    /// Length of an FFD frame's vertex array targeting this mesh: two
    /// coordinates per bone influence.
    pub fn world_coordinate_count(&self) -> usize {
        self.weights.iter().map(|w| w.len()).sum::<usize>() * 2
    }
}

/// A drawable or geometric shape assignable to a slot via a skin.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Attachment {
    Region(RegionAttachment),
    BoundingBox(BoundingBoxAttachment),
    Mesh(MeshAttachment),
    SkinnedMesh(SkinnedMeshAttachment),
}

impl Attachment {
    pub fn name(&self) -> &str {
        match self {
            Self::Region(a) => &a.name,
            Self::BoundingBox(a) => &a.name,
            Self::Mesh(a) => &a.name,
            Self::SkinnedMesh(a) => &a.name,
        }
    }
}

/// A named override set mapping `(slot index, attachment name)` to an
/// attachment. Skins exclusively own their attachments; there is no sharing
/// across skins in this format.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Skin {
    pub name: String,
    /// One map per slot, indexed by slot index.
    pub attachments: Vec<HashMap<String, Attachment>>,
}

impl Skin {
    pub fn attachment(&self, slot_index: usize, name: &str) -> Option<&Attachment> {
        self.attachments.get(slot_index)?.get(name)
    }
}

/// The immutable template of bones, slots, skins, events and animations for
/// one rigged character, built by a full parse and shared read-only by many
/// posed instances afterward.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SkeletonData {
    pub hash: Option<String>,
    pub version: Option<String>,
    pub width: f32,
    pub height: f32,
    pub bones: Vec<BoneData>,
    pub ik_constraints: Vec<IkConstraintData>,
    pub slots: Vec<SlotData>,
    /// All skins. When a "default" skin is present it is always at index 0,
    /// regardless of the file order of the named skins.
    pub skins: Vec<Skin>,
    /// Index of the "default" skin in `skins`, if present.
    pub default_skin: Option<usize>,
    pub events: Vec<EventData>,
    pub animations: Vec<Animation>,
}

impl SkeletonData {
    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    pub fn slot_index(&self, name: &str) -> Option<usize> {
        self.slots.iter().position(|s| s.name == name)
    }

    pub fn event_index(&self, name: &str) -> Option<usize> {
        self.events.iter().position(|e| e.name == name)
    }

    pub fn skin(&self, name: &str) -> Option<&Skin> {
        self.skins.iter().find(|s| s.name == name)
    }

    pub fn animation(&self, name: &str) -> Option<(usize, &Animation)> {
        self.animations
            .iter()
            .enumerate()
            .find(|(_, a)| a.name == name)
    }
}
