//! Geobuf decoder.
//!
//! Geobuf is a compact protobuf encoding of GeoJSON. Table cells carry it as
//! base64 text; [`decode_base64_geometry`] turns such a cell into a
//! [`Geometry`].
//!
//! Payloads wrapping a `Feature` yield that feature's geometry, or `None`
//! when the feature has none; payloads wrapping a bare `Geometry` yield it
//! directly.

pub mod decode;
pub mod error;
pub mod proto;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use prost::Message;
use tablemap_common::Geometry;

pub use decode::GeometryDecoder;
pub use error::{GeobufError, Result};

/// Standard alphabet, padding optional.
const CELL_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decode the geometry held by a raw geobuf message.
pub fn decode_geometry(bytes: &[u8]) -> Result<Option<Geometry>> {
    let data = proto::Data::decode(bytes)?;
    let decoder = GeometryDecoder::for_data(&data)?;

    match data.data_type {
        Some(proto::data::DataType::Feature(feature)) => feature
            .geometry
            .map(|geometry| decoder.decode(&geometry))
            .transpose(),
        Some(proto::data::DataType::Geometry(geometry)) => decoder.decode(&geometry).map(Some),
        Some(proto::data::DataType::FeatureCollection(_)) => {
            Err(GeobufError::UnsupportedPayload("feature collection"))
        }
        None => Err(GeobufError::UnsupportedPayload("empty message")),
    }
}

/// Decode base64 cell text, then the geobuf message inside it.
///
/// ASCII whitespace in the text is ignored.
pub fn decode_base64_geometry(text: &str) -> Result<Option<Geometry>> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    let bytes = CELL_ENGINE.decode(compact.as_bytes())?;
    tracing::trace!(bytes = bytes.len(), "Decoding geobuf cell");
    decode_geometry(&bytes)
}
