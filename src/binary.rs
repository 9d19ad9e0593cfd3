//! Spine 2.1 `.skel` (binary) loader.
//!
//! The loader is IO-free apart from [`SkeletonData::from_skel_file`]: it makes
//! a single forward-only pass over an in-memory byte slice, with no
//! backtracking. Section order is fixed by the format: header, bones, IK
//! constraints, slots, skins, events, animations. Animations resolve FFD
//! targets by name against the skins, so skins are always decoded first.

use crate::{
    Animation, Attachment, AttachmentFrame, AttachmentTimeline, BoneData, BoundingBoxAttachment,
    ColorFrame, ColorTimeline, Curve, DrawOrderFrame, DrawOrderTimeline, Error, Event, EventData,
    EventFrame, EventTimeline, FfdFrame, FfdTimeline, FlipFrame, FlipTimeline, IkConstraintData,
    IkConstraintTimeline, IkFrame, MeshAttachment, RegionAttachment, RotateFrame, RotateTimeline,
    ScaleTimeline, SkeletonData, Skin, SkinnedMeshAttachment, SlotData, Timeline,
    TimelineTargetKind, TranslateTimeline, VertexWeight, XyFrame,
};
use byteorder::{BigEndian, ByteOrder};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const ATTACHMENT_REGION: u8 = 0;
const ATTACHMENT_BOUNDING_BOX: u8 = 1;
const ATTACHMENT_MESH: u8 = 2;
const ATTACHMENT_SKINNED_MESH: u8 = 3;

const CURVE_LINEAR: u8 = 0;
const CURVE_STEPPED: u8 = 1;
const CURVE_BEZIER: u8 = 2;

const TIMELINE_SCALE: u8 = 0;
const TIMELINE_ROTATE: u8 = 1;
const TIMELINE_TRANSLATE: u8 = 2;
const TIMELINE_ATTACHMENT: u8 = 3;
const TIMELINE_COLOR: u8 = 4;
const TIMELINE_FLIPX: u8 = 5;
const TIMELINE_FLIPY: u8 = 6;

#[derive(Clone, Debug)]
pub(crate) struct BinaryInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> BinaryInput<'a> {
    pub(crate) fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, Error> {
        let Some(&b) = self.bytes.get(self.cursor) else {
            return Err(Error::OutOfData {
                offset: self.cursor,
            });
        };
        self.cursor += 1;
        Ok(b)
    }

    pub(crate) fn read_i8(&mut self) -> Result<i8, Error> {
        Ok(self.read_u8()? as i8)
    }

    pub(crate) fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    pub(crate) fn read_i32_be(&mut self) -> Result<i32, Error> {
        if self.remaining() < 4 {
            return Err(Error::OutOfData {
                offset: self.cursor,
            });
        }
        let v = BigEndian::read_i32(&self.bytes[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        Ok(v)
    }

    pub(crate) fn read_f32_be(&mut self) -> Result<f32, Error> {
        if self.remaining() < 4 {
            return Err(Error::OutOfData {
                offset: self.cursor,
            });
        }
        let v = BigEndian::read_f32(&self.bytes[self.cursor..self.cursor + 4]);
        self.cursor += 4;
        Ok(v)
    }

    /// Little-endian base-128 varint, at most 5 groups. Bits past 31 are
    /// dropped (the 5th group contributes only through `& 0x7F << 28`).
    /// With `optimize_positive` unset the result is zig-zag decoded.
    pub(crate) fn read_varint(&mut self, optimize_positive: bool) -> Result<i32, Error> {
        let mut b = self.read_u8()?;
        let mut value: u32 = (b & 0x7F) as u32;
        if (b & 0x80) != 0 {
            b = self.read_u8()?;
            value |= ((b & 0x7F) as u32) << 7;
            if (b & 0x80) != 0 {
                b = self.read_u8()?;
                value |= ((b & 0x7F) as u32) << 14;
                if (b & 0x80) != 0 {
                    b = self.read_u8()?;
                    value |= ((b & 0x7F) as u32) << 21;
                    if (b & 0x80) != 0 {
                        b = self.read_u8()?;
                        value |= ((b & 0x7F) as u32) << 28;
                    }
                }
            }
        }

        if optimize_positive {
            Ok(value as i32)
        } else {
            Ok((value >> 1) as i32 ^ -((value & 1) as i32))
        }
    }

    /// A non-negative varint used as a count or index.
    pub(crate) fn read_count(&mut self) -> Result<usize, Error> {
        let offset = self.cursor;
        let v = self.read_varint(true)?;
        if v < 0 {
            return Err(Error::Malformed {
                message: format!("negative count or index {v} at offset {offset}"),
            });
        }
        Ok(v as usize)
    }

    /// Length-prefixed string. A stored length of 0 means "absent" and a
    /// stored length of 1 is an explicit empty string; otherwise the content
    /// is `length - 1` bytes of UTF-8.
    pub(crate) fn read_string(&mut self) -> Result<Option<String>, Error> {
        let length = self.read_count()?;
        if length == 0 {
            return Ok(None);
        }
        let byte_len = length - 1;
        if self.remaining() < byte_len {
            return Err(Error::OutOfData {
                offset: self.cursor,
            });
        }
        let offset = self.cursor;
        let bytes = &self.bytes[self.cursor..self.cursor + byte_len];
        self.cursor += byte_len;
        let s = std::str::from_utf8(bytes).map_err(|e| Error::Malformed {
            message: format!("invalid utf-8 in string at offset {offset}: {e}"),
        })?;
        Ok(Some(s.to_string()))
    }

    pub(crate) fn read_color_rgba(&mut self) -> Result<[f32; 4], Error> {
        Ok([
            self.read_u8()? as f32 / 255.0,
            self.read_u8()? as f32 / 255.0,
            self.read_u8()? as f32 / 255.0,
            self.read_u8()? as f32 / 255.0,
        ])
    }

    /// Length-prefixed float array. The scale is applied per element during
    /// the read, matching the reference decoder's order of operations.
    pub(crate) fn read_float_array(&mut self, scale: f32) -> Result<Vec<f32>, Error> {
        let n = self.read_count()?;
        let mut out = Vec::with_capacity(n);
        if scale == 1.0 {
            for _ in 0..n {
                out.push(self.read_f32_be()?);
            }
        } else {
            for _ in 0..n {
                out.push(self.read_f32_be()? * scale);
            }
        }
        Ok(out)
    }

    /// Length-prefixed array of big-endian 16-bit values.
    pub(crate) fn read_short_array(&mut self) -> Result<Vec<u16>, Error> {
        let n = self.read_count()?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let high = self.read_u8()? as u16;
            let low = self.read_u8()? as u16;
            out.push(high << 8 | low);
        }
        Ok(out)
    }

    /// Length-prefixed array of positive-optimized varints.
    pub(crate) fn read_int_array(&mut self) -> Result<Vec<i32>, Error> {
        let n = self.read_count()?;
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(self.read_varint(true)?);
        }
        Ok(out)
    }
}

fn read_curve(input: &mut BinaryInput<'_>) -> Result<Curve, Error> {
    let offset = input.cursor;
    match input.read_u8()? {
        CURVE_LINEAR => Ok(Curve::Linear),
        CURVE_STEPPED => Ok(Curve::Stepped),
        CURVE_BEZIER => Ok(Curve::Bezier {
            cx1: input.read_f32_be()?,
            cy1: input.read_f32_be()?,
            cx2: input.read_f32_be()?,
            cy2: input.read_f32_be()?,
        }),
        other => Err(Error::Malformed {
            message: format!("invalid curve type {other} at offset {offset}"),
        }),
    }
}

fn read_attachment(
    input: &mut BinaryInput<'_>,
    attachment_name: &str,
    scale: f32,
    nonessential: bool,
) -> Result<Attachment, Error> {
    let name = input
        .read_string()?
        .unwrap_or_else(|| attachment_name.to_string());
    let type_tag = input.read_u8()?;

    match type_tag {
        ATTACHMENT_REGION => {
            let path = input.read_string()?.unwrap_or_else(|| name.clone());
            let mut region = RegionAttachment {
                name,
                path,
                x: input.read_f32_be()? * scale,
                y: input.read_f32_be()? * scale,
                scale_x: input.read_f32_be()?,
                scale_y: input.read_f32_be()?,
                rotation: input.read_f32_be()?,
                width: input.read_f32_be()? * scale,
                height: input.read_f32_be()? * scale,
                color: input.read_color_rgba()?,
                offset: [0.0; 8],
            };
            region.update_offset();
            Ok(Attachment::Region(region))
        }
        ATTACHMENT_BOUNDING_BOX => {
            let vertices = input.read_float_array(scale)?;
            Ok(Attachment::BoundingBox(BoundingBoxAttachment {
                name,
                vertices,
            }))
        }
        ATTACHMENT_MESH => {
            let path = input.read_string()?.unwrap_or_else(|| name.clone());
            let region_uvs = input.read_float_array(1.0)?;
            let triangles: Vec<u32> = input
                .read_short_array()?
                .into_iter()
                .map(u32::from)
                .collect();
            let vertices = input.read_float_array(scale)?;
            if region_uvs.len() != vertices.len() {
                return Err(Error::Malformed {
                    message: format!(
                        "mesh '{name}' has {} texture coordinates for {} vertex coordinates",
                        region_uvs.len(),
                        vertices.len()
                    ),
                });
            }
            let vertex_count = vertices.len() / 2;
            if let Some(&t) = triangles.iter().find(|&&t| t as usize >= vertex_count) {
                return Err(Error::Malformed {
                    message: format!(
                        "mesh '{name}' triangle index {t} exceeds vertex count {vertex_count}"
                    ),
                });
            }
            let color = input.read_color_rgba()?;
            let hull_length = input.read_count()? << 1;
            let (edges, width, height) = if nonessential {
                (
                    input.read_int_array()?,
                    input.read_f32_be()? * scale,
                    input.read_f32_be()? * scale,
                )
            } else {
                (Vec::new(), 0.0, 0.0)
            };
            Ok(Attachment::Mesh(MeshAttachment {
                name,
                path,
                region_uvs,
                triangles,
                vertices,
                color,
                hull_length,
                edges,
                width,
                height,
            }))
        }
        ATTACHMENT_SKINNED_MESH => {
            let path = input.read_string()?.unwrap_or_else(|| name.clone());
            let region_uvs = input.read_float_array(1.0)?;
            let triangles: Vec<u32> = input
                .read_short_array()?
                .into_iter()
                .map(u32::from)
                .collect();
            // The stream prefix is the packed float count: one count float
            // plus four floats per influence, summed over all vertices. Bone
            // counts and bone indices are stored as floats in this format
            // version.
            let float_count = input.read_count()?;
            let mut weights = Vec::with_capacity(region_uvs.len() / 2);
            let mut consumed = 0usize;
            while consumed < float_count {
                let bone_count = input.read_f32_be()? as usize;
                consumed += 1 + bone_count * 4;
                if consumed > float_count {
                    return Err(Error::Malformed {
                        message: format!(
                            "weighted mesh '{name}' bone-weight stream overruns its declared \
                             float count {float_count}"
                        ),
                    });
                }
                let mut influences = Vec::with_capacity(bone_count);
                for _ in 0..bone_count {
                    let bone = input.read_f32_be()? as usize;
                    let x = input.read_f32_be()? * scale;
                    let y = input.read_f32_be()? * scale;
                    let weight = input.read_f32_be()?;
                    influences.push(VertexWeight { bone, x, y, weight });
                }
                weights.push(influences);
            }
            if region_uvs.len() != weights.len() * 2 {
                return Err(Error::Malformed {
                    message: format!(
                        "weighted mesh '{name}' has {} texture coordinates for {} vertices",
                        region_uvs.len(),
                        weights.len()
                    ),
                });
            }
            let vertex_count = weights.len();
            if let Some(&t) = triangles.iter().find(|&&t| t as usize >= vertex_count) {
                return Err(Error::Malformed {
                    message: format!(
                        "weighted mesh '{name}' triangle index {t} exceeds vertex count \
                         {vertex_count}"
                    ),
                });
            }
            let color = input.read_color_rgba()?;
            let hull_length = input.read_count()? * 2;
            let (edges, width, height) = if nonessential {
                (
                    input.read_int_array()?,
                    input.read_f32_be()? * scale,
                    input.read_f32_be()? * scale,
                )
            } else {
                (Vec::new(), 0.0, 0.0)
            };
            Ok(Attachment::SkinnedMesh(SkinnedMeshAttachment {
                name,
                path,
                region_uvs,
                triangles,
                weights,
                color,
                hull_length,
                edges,
                width,
                height,
            }))
        }
        // The Path tag (4) is reserved in this version but has no encoding.
        other => Err(Error::UnsupportedAttachmentType { name, value: other }),
    }
}

/// Reads one skin. A stored slot count of zero means the skin was omitted
/// ("no skin"), which is distinct from an empty skin.
fn read_skin(
    input: &mut BinaryInput<'_>,
    skin_name: &str,
    slot_count: usize,
    scale: f32,
    nonessential: bool,
) -> Result<Option<Skin>, Error> {
    let skin_slot_count = input.read_count()?;
    if skin_slot_count == 0 {
        return Ok(None);
    }
    let mut attachments = vec![HashMap::new(); slot_count];
    for _ in 0..skin_slot_count {
        let slot_index = input.read_count()?;
        if slot_index >= slot_count {
            return Err(Error::Malformed {
                message: format!(
                    "skin '{skin_name}' references slot index {slot_index} (slot count {slot_count})"
                ),
            });
        }
        let attachment_count = input.read_count()?;
        for _ in 0..attachment_count {
            let name = input.read_string()?.unwrap_or_default();
            let attachment = read_attachment(input, &name, scale, nonessential)?;
            attachments[slot_index].insert(name, attachment);
        }
    }
    Ok(Some(Skin {
        name: skin_name.to_string(),
        attachments,
    }))
}

#[allow(clippy::too_many_arguments)]
fn read_animation(
    input: &mut BinaryInput<'_>,
    name: &str,
    bones: &[BoneData],
    slots: &[SlotData],
    ik_constraints: &[IkConstraintData],
    skins: &[Skin],
    events: &[EventData],
    scale: f32,
) -> Result<Animation, Error> {
    let mut timelines = Vec::new();

    // Slot timelines.
    for _ in 0..input.read_count()? {
        let slot_index = input.read_count()?;
        let slot = slots.get(slot_index).ok_or_else(|| Error::Malformed {
            message: format!(
                "animation '{name}' references slot index {slot_index} (slot count {})",
                slots.len()
            ),
        })?;
        for _ in 0..input.read_count()? {
            let timeline_type = input.read_u8()?;
            let frame_count = input.read_count()?;
            match timeline_type {
                TIMELINE_COLOR => {
                    let mut frames = Vec::with_capacity(frame_count);
                    for frame in 0..frame_count {
                        let time = input.read_f32_be()?;
                        let color = input.read_color_rgba()?;
                        let curve = if frame + 1 < frame_count {
                            read_curve(input)?
                        } else {
                            Curve::Linear
                        };
                        frames.push(ColorFrame { time, color, curve });
                    }
                    timelines.push(Timeline::Color(ColorTimeline {
                        slot: slot_index,
                        frames,
                    }));
                }
                TIMELINE_ATTACHMENT => {
                    let mut frames = Vec::with_capacity(frame_count);
                    for _ in 0..frame_count {
                        let time = input.read_f32_be()?;
                        let attachment = input.read_string()?;
                        frames.push(AttachmentFrame { time, attachment });
                    }
                    timelines.push(Timeline::Attachment(AttachmentTimeline {
                        slot: slot_index,
                        frames,
                    }));
                }
                other => {
                    return Err(Error::InvalidTimelineType {
                        kind: TimelineTargetKind::Slot,
                        name: slot.name.clone(),
                        value: other,
                    });
                }
            }
        }
    }

    // Bone timelines.
    for _ in 0..input.read_count()? {
        let bone_index = input.read_count()?;
        let bone = bones.get(bone_index).ok_or_else(|| Error::Malformed {
            message: format!(
                "animation '{name}' references bone index {bone_index} (bone count {})",
                bones.len()
            ),
        })?;
        for _ in 0..input.read_count()? {
            let timeline_type = input.read_u8()?;
            let frame_count = input.read_count()?;
            match timeline_type {
                TIMELINE_ROTATE => {
                    let mut frames = Vec::with_capacity(frame_count);
                    for frame in 0..frame_count {
                        let time = input.read_f32_be()?;
                        let angle = input.read_f32_be()?;
                        let curve = if frame + 1 < frame_count {
                            read_curve(input)?
                        } else {
                            Curve::Linear
                        };
                        frames.push(RotateFrame { time, angle, curve });
                    }
                    timelines.push(Timeline::Rotate(RotateTimeline {
                        bone: bone_index,
                        frames,
                    }));
                }
                TIMELINE_TRANSLATE | TIMELINE_SCALE => {
                    // Translate values are unit-scaled; scale ratios are not.
                    let timeline_scale = if timeline_type == TIMELINE_TRANSLATE {
                        scale
                    } else {
                        1.0
                    };
                    let mut frames = Vec::with_capacity(frame_count);
                    for frame in 0..frame_count {
                        let time = input.read_f32_be()?;
                        let x = input.read_f32_be()? * timeline_scale;
                        let y = input.read_f32_be()? * timeline_scale;
                        let curve = if frame + 1 < frame_count {
                            read_curve(input)?
                        } else {
                            Curve::Linear
                        };
                        frames.push(XyFrame { time, x, y, curve });
                    }
                    timelines.push(if timeline_type == TIMELINE_TRANSLATE {
                        Timeline::Translate(TranslateTimeline {
                            bone: bone_index,
                            frames,
                        })
                    } else {
                        Timeline::Scale(ScaleTimeline {
                            bone: bone_index,
                            frames,
                        })
                    });
                }
                TIMELINE_FLIPX | TIMELINE_FLIPY => {
                    let mut frames = Vec::with_capacity(frame_count);
                    for _ in 0..frame_count {
                        let time = input.read_f32_be()?;
                        let flip = input.read_bool()?;
                        frames.push(FlipFrame { time, flip });
                    }
                    timelines.push(Timeline::Flip(FlipTimeline {
                        bone: bone_index,
                        x: timeline_type == TIMELINE_FLIPX,
                        frames,
                    }));
                }
                other => {
                    return Err(Error::InvalidTimelineType {
                        kind: TimelineTargetKind::Bone,
                        name: bone.name.clone(),
                        value: other,
                    });
                }
            }
        }
    }

    // IK constraint timelines.
    for _ in 0..input.read_count()? {
        let constraint = input.read_count()?;
        if constraint >= ik_constraints.len() {
            return Err(Error::Malformed {
                message: format!(
                    "animation '{name}' references IK constraint index {constraint} (constraint count {})",
                    ik_constraints.len()
                ),
            });
        }
        let frame_count = input.read_count()?;
        let mut frames = Vec::with_capacity(frame_count);
        for frame in 0..frame_count {
            let time = input.read_f32_be()?;
            let mix = input.read_f32_be()?;
            let bend_direction = input.read_i8()?;
            let curve = if frame + 1 < frame_count {
                read_curve(input)?
            } else {
                Curve::Linear
            };
            frames.push(IkFrame {
                time,
                mix,
                bend_direction,
                curve,
            });
        }
        timelines.push(Timeline::IkConstraint(IkConstraintTimeline {
            constraint,
            frames,
        }));
    }

    // FFD timelines, grouped per skin then per slot. Targets are resolved by
    // name against the already-decoded skins to size each frame's vertex
    // array (and, for plain meshes, to materialize absolute positions).
    for _ in 0..input.read_count()? {
        let skin_index = input.read_count()?;
        let skin = skins.get(skin_index).ok_or_else(|| Error::Malformed {
            message: format!(
                "animation '{name}' references skin index {skin_index} (skin count {})",
                skins.len()
            ),
        })?;
        for _ in 0..input.read_count()? {
            let slot_index = input.read_count()?;
            for _ in 0..input.read_count()? {
                let attachment_name = input.read_string()?.unwrap_or_default();
                let attachment = skin.attachment(slot_index, &attachment_name).ok_or_else(
                    || Error::Malformed {
                        message: format!(
                            "animation '{name}' deforms missing attachment '{attachment_name}' \
                             (skin '{}', slot index {slot_index})",
                            skin.name
                        ),
                    },
                )?;
                let (vertex_count, rest_vertices) = match attachment {
                    Attachment::Mesh(mesh) => {
                        (mesh.world_coordinate_count(), Some(mesh.vertices.as_slice()))
                    }
                    Attachment::SkinnedMesh(mesh) => (mesh.world_coordinate_count(), None),
                    _ => {
                        return Err(Error::Malformed {
                            message: format!(
                                "animation '{name}' deforms non-mesh attachment '{attachment_name}' \
                                 (skin '{}', slot index {slot_index})",
                                skin.name
                            ),
                        });
                    }
                };

                let frame_count = input.read_count()?;
                let mut frames = Vec::with_capacity(frame_count);
                for frame in 0..frame_count {
                    let time = input.read_f32_be()?;
                    let vertices = read_ffd_vertices(input, vertex_count, rest_vertices, scale)?;
                    let curve = if frame + 1 < frame_count {
                        read_curve(input)?
                    } else {
                        Curve::Linear
                    };
                    frames.push(FfdFrame {
                        time,
                        vertices,
                        curve,
                    });
                }
                timelines.push(Timeline::Ffd(FfdTimeline {
                    skin: skin_index,
                    slot: slot_index,
                    attachment: attachment_name,
                    frames,
                }));
            }
        }
    }

    // Draw order timeline (optional).
    let draw_order_count = input.read_count()?;
    if draw_order_count > 0 {
        let mut frames = Vec::with_capacity(draw_order_count);
        for _ in 0..draw_order_count {
            let draw_order = read_draw_order(input, name, slots.len())?;
            // The frame time follows the offset list in this format version.
            let time = input.read_f32_be()?;
            frames.push(DrawOrderFrame { time, draw_order });
        }
        timelines.push(Timeline::DrawOrder(DrawOrderTimeline { frames }));
    }

    // Event timeline (optional).
    let event_count = input.read_count()?;
    if event_count > 0 {
        let mut frames = Vec::with_capacity(event_count);
        for _ in 0..event_count {
            let time = input.read_f32_be()?;
            let data = input.read_count()?;
            let template = events.get(data).ok_or_else(|| Error::Malformed {
                message: format!(
                    "animation '{name}' references event index {data} (event count {})",
                    events.len()
                ),
            })?;
            let int_value = input.read_varint(false)?;
            let float_value = input.read_f32_be()?;
            let string_value = if input.read_bool()? {
                input.read_string()?
            } else {
                template.string_value.clone()
            };
            frames.push(EventFrame {
                time,
                event: Event {
                    data,
                    int_value,
                    float_value,
                    string_value,
                },
            });
        }
        timelines.push(Timeline::Event(EventTimeline { frames }));
    }

    let duration = timelines
        .iter()
        .map(Timeline::last_time)
        .fold(0.0, f32::max);

    Ok(Animation {
        name: name.to_string(),
        duration,
        timelines,
    })
}

/// One FFD frame's vertex array. A zero coordinate count keys the rest pose:
/// the mesh's own vertices for a plain mesh, all zeros otherwise. A nonzero
/// count keys a contiguous `[start, start + count)` range; for a plain mesh
/// the rest-pose vertices are then added element-wise, so the stored frame
/// holds absolute positions rather than deltas.
fn read_ffd_vertices(
    input: &mut BinaryInput<'_>,
    vertex_count: usize,
    rest_vertices: Option<&[f32]>,
    scale: f32,
) -> Result<Vec<f32>, Error> {
    let count = input.read_count()?;
    if count == 0 {
        return Ok(match rest_vertices {
            Some(rest) => rest.to_vec(),
            None => vec![0.0; vertex_count],
        });
    }

    let start = input.read_count()?;
    let end = start + count;
    if end > vertex_count {
        return Err(Error::Malformed {
            message: format!(
                "FFD frame range {start}..{end} exceeds vertex coordinate count {vertex_count}"
            ),
        });
    }
    let mut vertices = vec![0.0; vertex_count];
    for v in &mut vertices[start..end] {
        *v = input.read_f32_be()? * scale;
    }
    if let Some(rest) = rest_vertices {
        for (v, r) in vertices.iter_mut().zip(rest) {
            *v += r;
        }
    }
    Ok(vertices)
}

/// Reconstructs a full slot permutation from the sparse offset encoding: a
/// count of explicitly moved slots, then per moved slot its original index
/// and a forward offset from the next unassigned original position. All
/// unmentioned slots keep their relative order in the remaining positions.
fn read_draw_order(
    input: &mut BinaryInput<'_>,
    animation_name: &str,
    slot_count: usize,
) -> Result<Vec<usize>, Error> {
    let offset_count = input.read_count()?;
    if offset_count > slot_count {
        return Err(Error::Malformed {
            message: format!(
                "animation '{animation_name}' draw order moves {offset_count} slots \
                 (slot count {slot_count})"
            ),
        });
    }

    let mut draw_order: Vec<Option<usize>> = vec![None; slot_count];
    let mut unchanged = Vec::with_capacity(slot_count - offset_count);
    let mut original = 0usize;
    for _ in 0..offset_count {
        let slot_index = input.read_count()?;
        if slot_index < original || slot_index >= slot_count {
            return Err(Error::Malformed {
                message: format!(
                    "animation '{animation_name}' draw order has out-of-order slot index \
                     {slot_index} (slot count {slot_count})"
                ),
            });
        }
        while original != slot_index {
            unchanged.push(original);
            original += 1;
        }
        let offset = input.read_count()?;
        let position = original + offset;
        if position >= slot_count {
            return Err(Error::Malformed {
                message: format!(
                    "animation '{animation_name}' draw order moves slot {slot_index} to \
                     position {position} (slot count {slot_count})"
                ),
            });
        }
        if draw_order[position].replace(original).is_some() {
            return Err(Error::Malformed {
                message: format!(
                    "animation '{animation_name}' draw order assigns position {position} twice"
                ),
            });
        }
        original += 1;
    }
    while original < slot_count {
        unchanged.push(original);
        original += 1;
    }

    // Fill the gaps from the back so unmentioned slots keep relative order.
    let mut out = Vec::with_capacity(slot_count);
    for entry in draw_order.iter().rev() {
        match entry {
            Some(slot) => out.push(*slot),
            None => {
                let Some(slot) = unchanged.pop() else {
                    return Err(Error::Malformed {
                        message: format!(
                            "animation '{animation_name}' draw order is not a permutation"
                        ),
                    });
                };
                out.push(slot);
            }
        }
    }
    out.reverse();
    Ok(out)
}

impl SkeletonData {
    /// Decodes a complete `.skel` document.
    pub fn from_skel_bytes(bytes: &[u8]) -> Result<Arc<Self>, Error> {
        Self::from_skel_bytes_with_scale(bytes, 1.0)
    }

    /// Decodes a complete `.skel` document, multiplying positions, lengths
    /// and sizes by `scale`. Scale ratios and texture coordinates are never
    /// scaled.
    pub fn from_skel_bytes_with_scale(bytes: &[u8], scale: f32) -> Result<Arc<Self>, Error> {
        let scale = if scale.is_finite() { scale } else { 1.0 };
        let mut input = BinaryInput::new(bytes);

        let hash = input.read_string()?.filter(|s| !s.is_empty());
        let version = input.read_string()?.filter(|s| !s.is_empty());
        let width = input.read_f32_be()?;
        let height = input.read_f32_be()?;

        let nonessential = input.read_bool()?;
        if nonessential {
            let _ = input.read_string()?; // images path
        }

        // Bones.
        let bones_count = input.read_count()?;
        let mut bones = Vec::with_capacity(bones_count);
        for i in 0..bones_count {
            let name = input.read_string()?.unwrap_or_default();
            let parent_index = input.read_count()?;
            // Parent index 0 means root; otherwise it is 1-based into the
            // bones already read.
            let parent = if parent_index == 0 {
                None
            } else if parent_index - 1 < i {
                Some(parent_index - 1)
            } else {
                return Err(Error::Malformed {
                    message: format!(
                        "bone '{name}' references parent index {parent_index} before it is defined"
                    ),
                });
            };
            let x = input.read_f32_be()? * scale;
            let y = input.read_f32_be()? * scale;
            let scale_x = input.read_f32_be()?;
            let scale_y = input.read_f32_be()?;
            let rotation = input.read_f32_be()?;
            let length = input.read_f32_be()? * scale;
            let flip_x = input.read_bool()?;
            let flip_y = input.read_bool()?;
            let inherit_scale = input.read_bool()?;
            let inherit_rotation = input.read_bool()?;
            if nonessential {
                let _ = input.read_i32_be()?; // bone color
            }
            bones.push(BoneData {
                name,
                parent,
                length,
                x,
                y,
                scale_x,
                scale_y,
                rotation,
                flip_x,
                flip_y,
                inherit_scale,
                inherit_rotation,
            });
        }

        // IK constraints.
        let ik_count = input.read_count()?;
        let mut ik_constraints = Vec::with_capacity(ik_count);
        for _ in 0..ik_count {
            let name = input.read_string()?.unwrap_or_default();
            let constrained_count = input.read_count()?;
            let mut constrained = Vec::with_capacity(constrained_count);
            for _ in 0..constrained_count {
                constrained.push(read_bone_index(&mut input, &bones, &name)?);
            }
            let target = read_bone_index(&mut input, &bones, &name)?;
            let mix = input.read_f32_be()?;
            let bend_direction = input.read_i8()?;
            ik_constraints.push(IkConstraintData {
                name,
                bones: constrained,
                target,
                mix,
                bend_direction,
            });
        }

        // Slots.
        let slots_count = input.read_count()?;
        let mut slots = Vec::with_capacity(slots_count);
        for _ in 0..slots_count {
            let name = input.read_string()?.unwrap_or_default();
            let bone = read_bone_index(&mut input, &bones, &name)?;
            let color = input.read_color_rgba()?;
            let attachment = input.read_string()?;
            let additive_blending = input.read_bool()?;
            slots.push(SlotData {
                name,
                bone,
                color,
                attachment,
                additive_blending,
            });
        }

        // Skins: the optional default skin first, then named skins. The
        // default skin always ends up at index 0 when present.
        let mut skins = Vec::new();
        let default_skin = read_skin(&mut input, "default", slots.len(), scale, nonessential)?;
        let default_skin_index = default_skin.as_ref().map(|_| 0);
        if let Some(skin) = default_skin {
            skins.push(skin);
        }
        let named_skin_count = input.read_count()?;
        for _ in 0..named_skin_count {
            let skin_name = input.read_string()?.unwrap_or_default();
            let skin = read_skin(&mut input, &skin_name, slots.len(), scale, nonessential)?
                .unwrap_or_else(|| Skin {
                    name: skin_name,
                    attachments: vec![HashMap::new(); slots.len()],
                });
            skins.push(skin);
        }

        // Events.
        let events_count = input.read_count()?;
        let mut events = Vec::with_capacity(events_count);
        for _ in 0..events_count {
            let name = input.read_string()?.unwrap_or_default();
            let int_value = input.read_varint(false)?;
            let float_value = input.read_f32_be()?;
            let string_value = input.read_string()?;
            events.push(EventData {
                name,
                int_value,
                float_value,
                string_value,
            });
        }

        // Animations. Skins are fully decoded at this point, which FFD
        // timeline resolution relies on.
        let animations_count = input.read_count()?;
        let mut animations = Vec::with_capacity(animations_count);
        for _ in 0..animations_count {
            let name = input.read_string()?.unwrap_or_default();
            let animation = read_animation(
                &mut input,
                &name,
                &bones,
                &slots,
                &ik_constraints,
                &skins,
                &events,
                scale,
            )?;
            animations.push(animation);
        }

        Ok(Arc::new(SkeletonData {
            hash,
            version,
            width,
            height,
            bones,
            ik_constraints,
            slots,
            skins,
            default_skin: default_skin_index,
            events,
            animations,
        }))
    }

    /// Reads and decodes a `.skel` file. The file is read once, up front;
    /// decoding itself is a pure in-memory pass.
    pub fn from_skel_file(path: impl AsRef<Path>) -> Result<Arc<Self>, Error> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|_| Error::FileUnreadable {
            path: path.display().to_string(),
        })?;
        if bytes.is_empty() {
            return Err(Error::FileUnreadable {
                path: path.display().to_string(),
            });
        }
        Self::from_skel_bytes(&bytes)
    }
}

fn read_bone_index(
    input: &mut BinaryInput<'_>,
    bones: &[BoneData],
    context: &str,
) -> Result<usize, Error> {
    let index = input.read_count()?;
    if index >= bones.len() {
        return Err(Error::Malformed {
            message: format!(
                "'{context}' references bone index {index} (bone count {})",
                bones.len()
            ),
        });
    }
    Ok(index)
}
