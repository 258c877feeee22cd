/// Maps a `TypedArray3` to another `TypedArray3` by calling a function on its variant.
/// Call via `map_typed_array3!(input, array => function)`.
#[macro_export]
macro_rules! map_typed_array3 {
    ($input_array:expr, $array:ident => $function_call:expr) => {
        $crate::map_typed_array3!(
            @variants $input_array, $array => $function_call,
            U8, U16, U32, U64, I8, I16, I32, I64, F32, F64
        )
    };

    (@variants $input_array:expr, $array:ident => $function_call:expr, $($variant:tt),+) => {
        match $input_array {
            $(
                $crate::raster::TypedArray3::$variant($array) => {
                    $crate::raster::TypedArray3::$variant($function_call)
                }
            )+
        }
    };
}

/// Calls a function on a `TypedArray3` by calling it on its variant.
/// Call via `call_typed_array3!(input, array => function)`.
#[macro_export]
macro_rules! call_typed_array3 {
    ($input_array:expr, $array:ident => $function_call:expr) => {
        $crate::call_typed_array3!(
            @variants $input_array, $array => $function_call,
            U8, U16, U32, U64, I8, I16, I32, I64, F32, F64
        )
    };

    (@variants $input_array:expr, $array:ident => $function_call:expr, $($variant:tt),+) => {
        match $input_array {
            $(
                $crate::raster::TypedArray3::$variant($array) => $function_call,
            )+
        }
    };
}

/// Generates a `TypedArray3` of the variant given by a `RasterDataType`.
/// Call via `generate_typed_array3!(data_type, T => function)`,
/// where `T` is bound to the pixel type within the function.
#[macro_export]
macro_rules! generate_typed_array3 {
    ($data_type:expr, $pixel:ident => $function_call:expr) => {
        $crate::generate_typed_array3!(
            @variants $data_type, $pixel => $function_call,
            (U8, u8), (U16, u16), (U32, u32), (U64, u64), (I8, i8),
            (I16, i16), (I32, i32), (I64, i64), (F32, f32), (F64, f64)
        )
    };

    (@variants $data_type:expr, $pixel:ident => $function_call:expr, $(($variant:tt, $t:ty)),+) => {
        match $data_type {
            $(
                $crate::raster::RasterDataType::$variant => {
                    type $pixel = $t;
                    $crate::raster::TypedArray3::$variant($function_call)
                }
            )+
        }
    };
}
