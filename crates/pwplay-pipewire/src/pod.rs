//! SPA pod translation
//!
//! Reads `Format` params into [`FormatProposal`]s and writes the pods the
//! stream publishes: the `EnumFormat` list offered at connect, and the
//! `Buffers` / `Meta` params sent once a format is accepted.

use std::io::Cursor;
use std::mem::size_of;

use libspa::pod::deserialize::PodDeserializer;
use libspa::pod::serialize::PodSerializer;
use libspa::pod::{ChoiceValue, Object, Pod, Property, PropertyFlags, Value};
use libspa::utils::{Choice, ChoiceEnum, ChoiceFlags, Fraction, Id, Rectangle};
use libspa_sys as spa_sys;
use tracing::debug;

use pwplay_core::{
    BufferRequirements, FormatProposal, MediaSubtype, MediaType, MetaRequest, ParamUpdate, Range,
    VideoFormat, VideoSize,
};

use crate::error::{PipeWireError, Result};

/// `SPA_PARAM_Tag`, missing from older headers
const PARAM_TAG: u32 = 17;

/// Raw formats offered at connect, in order of preference
pub const OFFERED_RAW_FORMATS: [VideoFormat; 4] = [
    VideoFormat::BGRx,
    VideoFormat::BGRA,
    VideoFormat::I420,
    VideoFormat::YV12,
];

const DEFAULT_SIZE: Rectangle = Rectangle {
    width: 320,
    height: 240,
};
const MIN_SIZE: Rectangle = Rectangle {
    width: 1,
    height: 1,
};
const MAX_SIZE: Rectangle = Rectangle {
    width: 8192,
    height: 8192,
};

/// Map an SPA media type id
pub fn media_type_from_raw(raw: u32) -> MediaType {
    match raw {
        spa_sys::SPA_MEDIA_TYPE_video => MediaType::Video,
        spa_sys::SPA_MEDIA_TYPE_audio => MediaType::Audio,
        other => MediaType::Other(other),
    }
}

/// Map an SPA media subtype id
pub fn media_subtype_from_raw(raw: u32) -> MediaSubtype {
    match raw {
        spa_sys::SPA_MEDIA_SUBTYPE_raw => MediaSubtype::Raw,
        spa_sys::SPA_MEDIA_SUBTYPE_dsp => MediaSubtype::Dsp,
        other => MediaSubtype::Other(other),
    }
}

/// Map an SPA video format id
pub fn video_format_from_raw(raw: u32) -> VideoFormat {
    match raw {
        spa_sys::SPA_VIDEO_FORMAT_BGRx => VideoFormat::BGRx,
        spa_sys::SPA_VIDEO_FORMAT_BGRA => VideoFormat::BGRA,
        spa_sys::SPA_VIDEO_FORMAT_RGBx => VideoFormat::RGBx,
        spa_sys::SPA_VIDEO_FORMAT_RGBA => VideoFormat::RGBA,
        spa_sys::SPA_VIDEO_FORMAT_I420 => VideoFormat::I420,
        spa_sys::SPA_VIDEO_FORMAT_YV12 => VideoFormat::YV12,
        spa_sys::SPA_VIDEO_FORMAT_RGBA_F32 => VideoFormat::RGBAF32,
        other => VideoFormat::Other(other),
    }
}

/// SPA video format id of a format
pub fn video_format_to_raw(format: VideoFormat) -> u32 {
    match format {
        VideoFormat::BGRx => spa_sys::SPA_VIDEO_FORMAT_BGRx,
        VideoFormat::BGRA => spa_sys::SPA_VIDEO_FORMAT_BGRA,
        VideoFormat::RGBx => spa_sys::SPA_VIDEO_FORMAT_RGBx,
        VideoFormat::RGBA => spa_sys::SPA_VIDEO_FORMAT_RGBA,
        VideoFormat::I420 => spa_sys::SPA_VIDEO_FORMAT_I420,
        VideoFormat::YV12 => spa_sys::SPA_VIDEO_FORMAT_YV12,
        VideoFormat::RGBAF32 => spa_sys::SPA_VIDEO_FORMAT_RGBA_F32,
        VideoFormat::Other(raw) => raw,
    }
}

/// Classify a `param_changed` callback
///
/// Format params that cannot be read are reported as cleared.
pub fn param_update(id: u32, param: Option<&Pod>) -> ParamUpdate {
    match id {
        spa_sys::SPA_PARAM_Format => match param.map(parse_format).transpose() {
            Ok(proposal) => ParamUpdate::Format(proposal),
            Err(e) => {
                debug!("Unreadable format param: {}", e);
                ParamUpdate::Format(None)
            }
        },
        PARAM_TAG => ParamUpdate::Tag,
        other => ParamUpdate::Other(other),
    }
}

/// Read a `Format` object
pub fn parse_format(pod: &Pod) -> Result<FormatProposal> {
    let (_, value) = PodDeserializer::deserialize_any_from(pod.as_bytes())
        .map_err(|e| PipeWireError::PodParse(format!("{:?}", e)))?;
    proposal_from_value(&value)
}

fn proposal_from_value(value: &Value) -> Result<FormatProposal> {
    let Value::Object(object) = value else {
        return Err(PipeWireError::PodParse("format is not an object".to_string()));
    };

    let media_type = property(object, spa_sys::SPA_FORMAT_mediaType)
        .and_then(id_value)
        .ok_or_else(|| PipeWireError::PodParse("missing media type".to_string()))?;
    let media_subtype = property(object, spa_sys::SPA_FORMAT_mediaSubtype)
        .and_then(id_value)
        .ok_or_else(|| PipeWireError::PodParse("missing media subtype".to_string()))?;

    Ok(FormatProposal {
        media_type: media_type_from_raw(media_type),
        media_subtype: media_subtype_from_raw(media_subtype),
        format: property(object, spa_sys::SPA_FORMAT_VIDEO_format)
            .and_then(id_value)
            .map(video_format_from_raw),
        size: property(object, spa_sys::SPA_FORMAT_VIDEO_size).and_then(size_value),
        framerate: property(object, spa_sys::SPA_FORMAT_VIDEO_framerate)
            .and_then(fraction_value)
            .map(|f| pwplay_core::Fraction {
                num: f.num,
                denom: f.denom,
            }),
    })
}

fn property(object: &Object, key: u32) -> Option<&Value> {
    object
        .properties
        .iter()
        .find(|p| p.key == key)
        .map(|p| &p.value)
}

// Fixated formats carry plain values; enumerations carry the default
fn id_value(value: &Value) -> Option<u32> {
    match value {
        Value::Id(Id(id)) => Some(*id),
        Value::Choice(ChoiceValue::Id(Choice(
            _,
            ChoiceEnum::None(Id(id)) | ChoiceEnum::Enum { default: Id(id), .. },
        ))) => Some(*id),
        _ => None,
    }
}

fn size_value(value: &Value) -> Option<VideoSize> {
    match value {
        Value::Rectangle(r)
        | Value::Choice(ChoiceValue::Rectangle(Choice(
            _,
            ChoiceEnum::None(r) | ChoiceEnum::Range { default: r, .. },
        ))) => Some(VideoSize::new(r.width, r.height)),
        _ => None,
    }
}

fn fraction_value(value: &Value) -> Option<Fraction> {
    match value {
        Value::Fraction(f)
        | Value::Choice(ChoiceValue::Fraction(Choice(
            _,
            ChoiceEnum::None(f) | ChoiceEnum::Range { default: f, .. },
        ))) => Some(*f),
        _ => None,
    }
}

fn prop(key: u32, value: Value) -> Property {
    Property {
        key,
        flags: PropertyFlags::empty(),
        value,
    }
}

fn pod_int<T: Copy + std::fmt::Display + TryInto<i32>>(value: T) -> Result<i32> {
    value
        .try_into()
        .map_err(|_| PipeWireError::PodSerialization(format!("{} does not fit a pod int", value)))
}

fn int(value: usize) -> Result<Value> {
    pod_int(value).map(Value::Int)
}

fn int_range(range: Range<i32>) -> Value {
    Value::Choice(ChoiceValue::Int(Choice(
        ChoiceFlags::empty(),
        ChoiceEnum::Range {
            default: range.default,
            min: range.min,
            max: range.max,
        },
    )))
}

/// Serialize a pod value
pub fn serialize(value: &Value) -> Result<Vec<u8>> {
    let (cursor, _) = PodSerializer::serialize(Cursor::new(Vec::new()), value)
        .map_err(|e| PipeWireError::PodSerialization(format!("{:?}", e)))?;
    Ok(cursor.into_inner())
}

/// View serialized bytes as a pod
pub fn as_pod(bytes: &[u8]) -> Result<&Pod> {
    Pod::from_bytes(bytes)
        .ok_or_else(|| PipeWireError::PodSerialization("invalid pod bytes".to_string()))
}

/// Raw video formats offered at connect
pub fn raw_enum_format() -> Value {
    let formats: Vec<Id> = OFFERED_RAW_FORMATS
        .iter()
        .map(|f| Id(video_format_to_raw(*f)))
        .collect();

    Value::Object(Object {
        type_: spa_sys::SPA_TYPE_OBJECT_Format,
        id: spa_sys::SPA_PARAM_EnumFormat,
        properties: vec![
            prop(spa_sys::SPA_FORMAT_mediaType, Value::Id(Id(spa_sys::SPA_MEDIA_TYPE_video))),
            prop(spa_sys::SPA_FORMAT_mediaSubtype, Value::Id(Id(spa_sys::SPA_MEDIA_SUBTYPE_raw))),
            prop(
                spa_sys::SPA_FORMAT_VIDEO_format,
                Value::Choice(ChoiceValue::Id(Choice(
                    ChoiceFlags::empty(),
                    ChoiceEnum::Enum {
                        default: formats[0],
                        alternatives: formats,
                    },
                ))),
            ),
            prop(
                spa_sys::SPA_FORMAT_VIDEO_size,
                Value::Choice(ChoiceValue::Rectangle(Choice(
                    ChoiceFlags::empty(),
                    ChoiceEnum::Range {
                        default: DEFAULT_SIZE,
                        min: MIN_SIZE,
                        max: MAX_SIZE,
                    },
                ))),
            ),
            prop(
                spa_sys::SPA_FORMAT_VIDEO_framerate,
                Value::Choice(ChoiceValue::Fraction(Choice(
                    ChoiceFlags::empty(),
                    ChoiceEnum::Range {
                        default: Fraction { num: 25, denom: 1 },
                        min: Fraction { num: 0, denom: 1 },
                        max: Fraction { num: 1000, denom: 1 },
                    },
                ))),
            ),
        ],
    })
}

/// Float dsp format offered at connect
///
/// The frame size of this format comes from the position IO area.
pub fn dsp_enum_format() -> Value {
    Value::Object(Object {
        type_: spa_sys::SPA_TYPE_OBJECT_Format,
        id: spa_sys::SPA_PARAM_EnumFormat,
        properties: vec![
            prop(spa_sys::SPA_FORMAT_mediaType, Value::Id(Id(spa_sys::SPA_MEDIA_TYPE_video))),
            prop(spa_sys::SPA_FORMAT_mediaSubtype, Value::Id(Id(spa_sys::SPA_MEDIA_SUBTYPE_dsp))),
            prop(
                spa_sys::SPA_FORMAT_VIDEO_format,
                Value::Id(Id(spa_sys::SPA_VIDEO_FORMAT_RGBA_F32)),
            ),
        ],
    })
}

/// Serialized `EnumFormat` params
pub fn enum_format_params() -> Result<Vec<Vec<u8>>> {
    [raw_enum_format(), dsp_enum_format()]
        .iter()
        .map(serialize)
        .collect()
}

/// Bytes of the cursor meta for a `width` x `height` bitmap
pub fn cursor_meta_size(size: VideoSize) -> usize {
    size_of::<spa_sys::spa_meta_cursor>()
        + size_of::<spa_sys::spa_meta_bitmap>()
        + size.width as usize * size.height as usize * 4
}

fn buffers_value(reqs: &BufferRequirements) -> Result<Value> {
    let mem_ptr = 1i32 << spa_sys::SPA_DATA_MemPtr;

    Ok(Value::Object(Object {
        type_: spa_sys::SPA_TYPE_OBJECT_ParamBuffers,
        id: spa_sys::SPA_PARAM_Buffers,
        properties: vec![
            prop(
                spa_sys::SPA_PARAM_BUFFERS_buffers,
                int_range(Range {
                    default: pod_int(reqs.buffers.default)?,
                    min: pod_int(reqs.buffers.min)?,
                    max: pod_int(reqs.buffers.max)?,
                }),
            ),
            prop(spa_sys::SPA_PARAM_BUFFERS_blocks, int(reqs.blocks as usize)?),
            prop(spa_sys::SPA_PARAM_BUFFERS_size, int(reqs.size)?),
            prop(spa_sys::SPA_PARAM_BUFFERS_stride, int(reqs.stride)?),
            prop(
                spa_sys::SPA_PARAM_BUFFERS_dataType,
                Value::Choice(ChoiceValue::Int(Choice(
                    ChoiceFlags::empty(),
                    ChoiceEnum::Flags {
                        default: mem_ptr,
                        flags: Vec::new(),
                    },
                ))),
            ),
        ],
    }))
}

fn meta_value(meta: &MetaRequest) -> Result<Value> {
    let (meta_type, size) = match meta {
        MetaRequest::Header => (
            spa_sys::SPA_META_Header,
            int(size_of::<spa_sys::spa_meta_header>())?,
        ),
        MetaRequest::VideoCrop => (
            spa_sys::SPA_META_VideoCrop,
            int(size_of::<spa_sys::spa_meta_region>())?,
        ),
        MetaRequest::Cursor(range) => (
            spa_sys::SPA_META_Cursor,
            int_range(Range {
                default: pod_int(cursor_meta_size(range.default))?,
                min: pod_int(cursor_meta_size(range.min))?,
                max: pod_int(cursor_meta_size(range.max))?,
            }),
        ),
    };

    Ok(Value::Object(Object {
        type_: spa_sys::SPA_TYPE_OBJECT_ParamMeta,
        id: spa_sys::SPA_PARAM_Meta,
        properties: vec![
            prop(spa_sys::SPA_PARAM_META_type, Value::Id(Id(meta_type))),
            prop(spa_sys::SPA_PARAM_META_size, size),
        ],
    }))
}

/// Serialized `Buffers` param followed by one `Meta` param per request
pub fn buffer_params(reqs: &BufferRequirements) -> Result<Vec<Vec<u8>>> {
    let mut params = vec![serialize(&buffers_value(reqs)?)?];
    for meta in &reqs.metas {
        params.push(serialize(&meta_value(meta)?)?);
    }
    Ok(params)
}
