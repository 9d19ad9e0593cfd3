//! Keyframe animation data: timelines, frames and interpolation curves.
//!
//! Timelines are plain data. Applying them to a posed skeleton instance is
//! the consuming runtime's job.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Interpolation from one keyframe to the next. Stored on every frame except
/// the last of its timeline; the last frame has nothing to interpolate into.
#[derive(Copy, Clone, Debug, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Curve {
    #[default]
    Linear,
    Stepped,
    Bezier {
        cx1: f32,
        cy1: f32,
        cx2: f32,
        cy2: f32,
    },
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RotateFrame {
    pub time: f32,
    /// Rotation relative to the setup pose, in degrees.
    pub angle: f32,
    pub curve: Curve,
}

/// Frame shared by translate and scale timelines.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct XyFrame {
    pub time: f32,
    pub x: f32,
    pub y: f32,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlipFrame {
    pub time: f32,
    pub flip: bool,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColorFrame {
    pub time: f32,
    pub color: [f32; 4],
    pub curve: Curve,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttachmentFrame {
    pub time: f32,
    /// `None` clears the slot's attachment.
    pub attachment: Option<String>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FfdFrame {
    pub time: f32,
    /// Materialized vertex array, one entry per coordinate of the target
    /// attachment. For a mesh attachment these are absolute positions (rest
    /// pose plus deltas); for a weighted mesh they are offsets applied after
    /// skinning, with unkeyed coordinates zero.
    pub vertices: Vec<f32>,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DrawOrderFrame {
    pub time: f32,
    /// Full permutation of slot indices, length equal to the slot count.
    /// `draw_order[i]` is the slot drawn at position `i`.
    pub draw_order: Vec<usize>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventFrame {
    pub time: f32,
    pub event: Event,
}

/// A keyed event instance. Int and float values are always explicit in the
/// file; the string either overrides or defaults from the [`EventData`]
/// template.
///
/// [`EventData`]: crate::EventData
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Event {
    /// Index of the template in [`SkeletonData::events`].
    ///
    /// [`SkeletonData::events`]: crate::SkeletonData::events
    pub data: usize,
    pub int_value: i32,
    pub float_value: f32,
    pub string_value: Option<String>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RotateTimeline {
    pub bone: usize,
    pub frames: Vec<RotateFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TranslateTimeline {
    pub bone: usize,
    pub frames: Vec<XyFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScaleTimeline {
    pub bone: usize,
    pub frames: Vec<XyFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FlipTimeline {
    pub bone: usize,
    /// `true` flips across X, `false` across Y.
    pub x: bool,
    pub frames: Vec<FlipFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ColorTimeline {
    pub slot: usize,
    pub frames: Vec<ColorFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AttachmentTimeline {
    pub slot: usize,
    pub frames: Vec<AttachmentFrame>,
}

/// Free-form deformation of one mesh attachment's vertices.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FfdTimeline {
    /// Index of the skin holding the target attachment.
    pub skin: usize,
    pub slot: usize,
    /// Name of the target attachment within `(skin, slot)`.
    pub attachment: String,
    pub frames: Vec<FfdFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DrawOrderTimeline {
    pub frames: Vec<DrawOrderFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventTimeline {
    pub frames: Vec<EventFrame>,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IkFrame {
    pub time: f32,
    pub mix: f32,
    pub bend_direction: i8,
    pub curve: Curve,
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IkConstraintTimeline {
    /// Index into [`SkeletonData::ik_constraints`].
    ///
    /// [`SkeletonData::ik_constraints`]: crate::SkeletonData::ik_constraints
    pub constraint: usize,
    pub frames: Vec<IkFrame>,
}

/// An ordered sequence of keyframes animating one property of one bone,
/// slot or constraint.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Timeline {
    Rotate(RotateTimeline),
    Translate(TranslateTimeline),
    Scale(ScaleTimeline),
    Flip(FlipTimeline),
    Color(ColorTimeline),
    Attachment(AttachmentTimeline),
    Ffd(FfdTimeline),
    DrawOrder(DrawOrderTimeline),
    Event(EventTimeline),
    IkConstraint(IkConstraintTimeline),
}

impl Timeline {
    /// Time of the last frame, or 0 for an empty timeline.
    pub fn last_time(&self) -> f32 {
        fn last<F>(frames: &[F], time: impl Fn(&F) -> f32) -> f32 {
            frames.last().map(time).unwrap_or(0.0)
        }
        match self {
            Self::Rotate(t) => last(&t.frames, |f| f.time),
            Self::Translate(t) => last(&t.frames, |f| f.time),
            Self::Scale(t) => last(&t.frames, |f| f.time),
            Self::Flip(t) => last(&t.frames, |f| f.time),
            Self::Color(t) => last(&t.frames, |f| f.time),
            Self::Attachment(t) => last(&t.frames, |f| f.time),
            Self::Ffd(t) => last(&t.frames, |f| f.time),
            Self::DrawOrder(t) => last(&t.frames, |f| f.time),
            Self::Event(t) => last(&t.frames, |f| f.time),
            Self::IkConstraint(t) => last(&t.frames, |f| f.time),
        }
    }
}

#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Animation {
    pub name: String,
    /// Maximum last-frame time across all timelines, in seconds.
    pub duration: f32,
    /// All timelines in file (decode) order.
    pub timelines: Vec<Timeline>,
}
