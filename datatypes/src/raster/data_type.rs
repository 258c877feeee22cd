use crate::error;
use crate::raster::TypedArray3;
use byteorder::ByteOrder;
use ndarray::Array3;
use num_traits::{AsPrimitive, Num, NumCast};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// A collection of required traits for a pixel type
pub trait Pixel:
    'static
    + Copy
    + std::fmt::Debug
    + Default
    + Sync
    + Send
    + Num
    + NumCast
    + PartialOrd
    + AsPrimitive<f64>
    + StaticRasterDataType
    + PixelCodec
{
    /// Converts with `as` semantics, i.e. saturating for floats to integers
    fn from_f64_lossy(value: f64) -> Self;

    fn into_typed_array(array: Array3<Self>) -> TypedArray3;

    fn typed_array_ref(array: &TypedArray3) -> Option<&Array3<Self>>;

    fn typed_array_mut(array: &mut TypedArray3) -> Option<&mut Array3<Self>>;

    /// Unwraps the array if it has this pixel type, otherwise returns it unchanged
    fn from_typed_array(array: TypedArray3) -> Result<Array3<Self>, TypedArray3>;
}

/// Packs pixels into raw bytes of a given byte order and back
pub trait PixelCodec: Sized {
    /// Decodes all complete values of `bytes`, a trailing partial value is ignored
    fn decode<B: ByteOrder>(bytes: &[u8]) -> Vec<Self>;

    /// Appends the encoded `values` to `buffer`
    fn encode<B: ByteOrder>(values: &[Self], buffer: &mut Vec<u8>);
}

impl PixelCodec for u8 {
    fn decode<B: ByteOrder>(bytes: &[u8]) -> Vec<Self> {
        bytes.to_vec()
    }

    fn encode<B: ByteOrder>(values: &[Self], buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(values);
    }
}

impl PixelCodec for i8 {
    fn decode<B: ByteOrder>(bytes: &[u8]) -> Vec<Self> {
        bytes.iter().map(|&byte| byte as i8).collect()
    }

    fn encode<B: ByteOrder>(values: &[Self], buffer: &mut Vec<u8>) {
        buffer.extend(values.iter().map(|&value| value as u8));
    }
}

macro_rules! impl_pixel_codec {
    ($($t:ty => $read:ident, $write:ident);+ $(;)?) => {
        $(
            impl PixelCodec for $t {
                fn decode<B: ByteOrder>(bytes: &[u8]) -> Vec<Self> {
                    let size = std::mem::size_of::<$t>();
                    let mut values = vec![<$t>::default(); bytes.len() / size];
                    B::$read(&bytes[..values.len() * size], &mut values);
                    values
                }

                fn encode<B: ByteOrder>(values: &[Self], buffer: &mut Vec<u8>) {
                    let start = buffer.len();
                    buffer.resize(start + values.len() * std::mem::size_of::<$t>(), 0);
                    B::$write(values, &mut buffer[start..]);
                }
            }
        )+
    };
}

impl_pixel_codec!(
    u16 => read_u16_into, write_u16_into;
    u32 => read_u32_into, write_u32_into;
    u64 => read_u64_into, write_u64_into;
    i16 => read_i16_into, write_i16_into;
    i32 => read_i32_into, write_i32_into;
    i64 => read_i64_into, write_i64_into;
    f32 => read_f32_into, write_f32_into;
    f64 => read_f64_into, write_f64_into;
);

pub trait StaticRasterDataType: Copy + Default + 'static {
    const TYPE: RasterDataType;
}

macro_rules! impl_pixel {
    ($($t:ty => $variant:ident),+ $(,)?) => {
        $(
            impl StaticRasterDataType for $t {
                const TYPE: RasterDataType = RasterDataType::$variant;
            }

            impl Pixel for $t {
                fn from_f64_lossy(value: f64) -> Self {
                    value as $t
                }

                fn into_typed_array(array: Array3<Self>) -> TypedArray3 {
                    TypedArray3::$variant(array)
                }

                fn typed_array_ref(array: &TypedArray3) -> Option<&Array3<Self>> {
                    match array {
                        TypedArray3::$variant(array) => Some(array),
                        _ => None,
                    }
                }

                fn typed_array_mut(array: &mut TypedArray3) -> Option<&mut Array3<Self>> {
                    match array {
                        TypedArray3::$variant(array) => Some(array),
                        _ => None,
                    }
                }

                fn from_typed_array(array: TypedArray3) -> Result<Array3<Self>, TypedArray3> {
                    match array {
                        TypedArray3::$variant(array) => Ok(array),
                        other => Err(other),
                    }
                }
            }
        )+
    };
}

impl_pixel!(
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    f32 => F32,
    f64 => F64,
);

#[derive(
    Debug,
    Ord,
    PartialOrd,
    Eq,
    PartialEq,
    Hash,
    Deserialize,
    Serialize,
    Copy,
    Clone,
    Display,
    EnumString,
    EnumIter,
)]
#[strum(ascii_case_insensitive)]
pub enum RasterDataType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl RasterDataType {
    /// Returns true if the given `value` is valid for the `RasterDataType` variant,
    /// i.e. it can be represented by a variable of the corresponding primitive data type
    #[allow(clippy::float_cmp)]
    #[allow(clippy::cast_lossless)]
    pub fn is_valid(self, value: f64) -> bool {
        match self {
            RasterDataType::U8 => value as u8 as f64 == value,
            RasterDataType::U16 => value as u16 as f64 == value,
            RasterDataType::U32 => value as u32 as f64 == value,
            RasterDataType::U64 => value as u64 as f64 == value,
            RasterDataType::I8 => value as i8 as f64 == value,
            RasterDataType::I16 => value as i16 as f64 == value,
            RasterDataType::I32 => value as i32 as f64 == value,
            RasterDataType::I64 => value as i64 as f64 == value,
            RasterDataType::F32 => value.is_nan() || value as f32 as f64 == value,
            RasterDataType::F64 => true,
        }
    }

    pub fn size_in_bytes(self) -> usize {
        match self {
            RasterDataType::U8 | RasterDataType::I8 => 1,
            RasterDataType::U16 | RasterDataType::I16 => 2,
            RasterDataType::U32 | RasterDataType::I32 | RasterDataType::F32 => 4,
            RasterDataType::U64 | RasterDataType::I64 | RasterDataType::F64 => 8,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, RasterDataType::F32 | RasterDataType::F64)
    }

    /// The `data type` code of the ENVI header format.
    /// ENVI has no signed byte type.
    pub fn envi_code(self) -> Option<u8> {
        Some(match self {
            RasterDataType::U8 => 1,
            RasterDataType::I16 => 2,
            RasterDataType::I32 => 3,
            RasterDataType::F32 => 4,
            RasterDataType::F64 => 5,
            RasterDataType::U16 => 12,
            RasterDataType::U32 => 13,
            RasterDataType::I64 => 14,
            RasterDataType::U64 => 15,
            RasterDataType::I8 => return None,
        })
    }

    pub fn from_envi_code(code: u8) -> Result<Self, error::Error> {
        Ok(match code {
            1 => RasterDataType::U8,
            2 => RasterDataType::I16,
            3 => RasterDataType::I32,
            4 => RasterDataType::F32,
            5 => RasterDataType::F64,
            12 => RasterDataType::U16,
            13 => RasterDataType::U32,
            14 => RasterDataType::I64,
            15 => RasterDataType::U64,
            _ => {
                return Err(error::Error::UnknownRasterDataType {
                    name: format!("ENVI data type {code}"),
                });
            }
        })
    }
}
