use crate::error;
use crate::raster::{GridShape2D, Margins, Pixel, PixelWindow, RasterDataType};
use crate::util::Result;
use crate::{call_typed_array3, generate_typed_array3, map_typed_array3};
use ndarray::{Array3, Axis, s};
use num_traits::AsPrimitive;
use snafu::ensure;

/// A three-dimensional pixel array `[bands, rows, columns]` of any supported data type
#[derive(Clone, Debug, PartialEq)]
pub enum TypedArray3 {
    U8(Array3<u8>),
    U16(Array3<u16>),
    U32(Array3<u32>),
    U64(Array3<u64>),
    I8(Array3<i8>),
    I16(Array3<i16>),
    I32(Array3<i32>),
    I64(Array3<i64>),
    F32(Array3<f32>),
    F64(Array3<f64>),
}

impl TypedArray3 {
    /// Boolean masks are stored as `U8` arrays of zeros and ones
    pub fn from_bool(array: &Array3<bool>) -> Self {
        TypedArray3::U8(array.mapv(u8::from))
    }

    pub fn zeros(data_type: RasterDataType, shape: [usize; 3]) -> Self {
        generate_typed_array3!(data_type, T => Array3::<T>::zeros(shape))
    }

    /// An array filled with `value`, cast to `data_type`
    pub fn full(data_type: RasterDataType, shape: [usize; 3], value: f64) -> Self {
        generate_typed_array3!(data_type, T => Array3::<T>::from_elem(shape, T::from_f64_lossy(value)))
    }

    pub fn data_type(&self) -> RasterDataType {
        match self {
            TypedArray3::U8(_) => RasterDataType::U8,
            TypedArray3::U16(_) => RasterDataType::U16,
            TypedArray3::U32(_) => RasterDataType::U32,
            TypedArray3::U64(_) => RasterDataType::U64,
            TypedArray3::I8(_) => RasterDataType::I8,
            TypedArray3::I16(_) => RasterDataType::I16,
            TypedArray3::I32(_) => RasterDataType::I32,
            TypedArray3::I64(_) => RasterDataType::I64,
            TypedArray3::F32(_) => RasterDataType::F32,
            TypedArray3::F64(_) => RasterDataType::F64,
        }
    }

    /// The shape as `[bands, rows, columns]`
    pub fn shape(&self) -> [usize; 3] {
        call_typed_array3!(self, array => {
            let (bands, rows, columns) = array.dim();
            [bands, rows, columns]
        })
    }

    pub fn band_count(&self) -> usize {
        self.shape()[0]
    }

    pub fn grid_shape(&self) -> GridShape2D {
        let [_, rows, columns] = self.shape();
        GridShape2D::new_unchecked([rows, columns])
    }

    pub fn as_array<T: Pixel>(&self) -> Option<&Array3<T>> {
        T::typed_array_ref(self)
    }

    pub fn as_array_mut<T: Pixel>(&mut self) -> Option<&mut Array3<T>> {
        T::typed_array_mut(self)
    }

    /// Unwraps the inner array if it has the pixel type `T`
    pub fn into_array<T: Pixel>(self) -> Result<Array3<T>> {
        T::from_typed_array(self).map_err(|array| error::Error::InvalidTypedArrayConversion {
            from: array.data_type(),
            to: T::TYPE,
        })
    }

    /// Converts the pixels to `T` with `as` semantics
    pub fn convert<T: Pixel>(&self) -> Array3<T> {
        call_typed_array3!(self, array => array.mapv(|v| T::from_f64_lossy(v.as_())))
    }

    /// Converts the pixels to `data_type` with `as` semantics
    #[must_use]
    pub fn convert_to(&self, data_type: RasterDataType) -> Self {
        if data_type == self.data_type() {
            return self.clone();
        }
        generate_typed_array3!(data_type, T => self.convert::<T>())
    }

    /// Copies the pixels of `window`, which must lie inside the array
    pub fn slice_window(&self, window: PixelWindow) -> Result<Self> {
        self.ensure_window_inside(window)?;

        let (y0, y1) = (window.offset.y() as usize, window.end_y() as usize);
        let (x0, x1) = (window.offset.x() as usize, window.end_x() as usize);

        Ok(map_typed_array3!(self, array => {
            array.slice(s![.., y0..y1, x0..x1]).to_owned()
        }))
    }

    /// Removes `margins` pixels from the sides of the array
    pub fn trim(&self, margins: Margins) -> Result<Self> {
        let [_, rows, columns] = self.shape();

        ensure!(
            margins.top + margins.bottom < rows && margins.left + margins.right < columns,
            error::InvalidArrayShape {
                expected: vec![margins.top + margins.bottom + 1, margins.left + margins.right + 1],
                actual: vec![rows, columns],
            }
        );

        self.slice_window(PixelWindow::new(
            [margins.top as isize, margins.left as isize].into(),
            GridShape2D::new_unchecked([
                rows - margins.top - margins.bottom,
                columns - margins.left - margins.right,
            ]),
        ))
    }

    /// Copies `source` into `window`, converting its pixels to the type of `self`
    pub fn assign_window(&mut self, window: PixelWindow, source: &TypedArray3) -> Result<()> {
        self.ensure_window_inside(window)?;

        let [bands, ..] = self.shape();
        let expected = vec![
            bands,
            window.shape.axis_size_y(),
            window.shape.axis_size_x(),
        ];
        ensure!(
            source.shape().to_vec() == expected,
            error::InvalidArrayShape {
                expected,
                actual: source.shape().to_vec(),
            }
        );

        let (y0, y1) = (window.offset.y() as usize, window.end_y() as usize);
        let (x0, x1) = (window.offset.x() as usize, window.end_x() as usize);

        let source = source.convert_to(self.data_type());
        call_typed_array3!(self, array => {
            if let Some(source) = source.as_array() {
                array.slice_mut(s![.., y0..y1, x0..x1]).assign(source);
            }
        });

        Ok(())
    }

    /// A single band as a one band array
    pub fn band(&self, index: usize) -> Result<Self> {
        let bands = self.band_count();
        ensure!(index < bands, error::BandIndexOutOfRange { index, bands });

        Ok(map_typed_array3!(self, array => {
            array.slice(s![index..=index, .., ..]).to_owned()
        }))
    }

    /// Stacks the bands of all arrays, converting them to the type of the first one
    pub fn stack_bands(arrays: &[TypedArray3]) -> Result<Self> {
        let Some((first, rest)) = arrays.split_first() else {
            return Err(error::Error::EmptyArrayStack);
        };

        let grid_shape = first.grid_shape();
        for array in rest {
            ensure!(
                array.grid_shape() == grid_shape,
                error::InvalidArrayShape {
                    expected: grid_shape.shape_array.to_vec(),
                    actual: array.grid_shape().shape_array.to_vec(),
                }
            );
        }

        let data_type = first.data_type();
        let converted: Vec<TypedArray3> = arrays.iter().map(|a| a.convert_to(data_type)).collect();

        Ok(generate_typed_array3!(data_type, T => {
            let views: Vec<_> = converted
                .iter()
                .filter_map(TypedArray3::as_array::<T>)
                .map(Array3::view)
                .collect();
            ndarray::concatenate(Axis(0), &views).map_err(|_| error::Error::InvalidArrayShape {
                expected: grid_shape.shape_array.to_vec(),
                actual: vec![],
            })?
        }))
    }

    fn ensure_window_inside(&self, window: PixelWindow) -> Result<()> {
        ensure!(
            window.is_inside(self.grid_shape()),
            error::OutOfBounds {
                window,
                shape: self.grid_shape(),
            }
        );
        Ok(())
    }
}

impl<T: Pixel> From<Array3<T>> for TypedArray3 {
    fn from(array: Array3<T>) -> Self {
        T::into_typed_array(array)
    }
}

impl From<Array3<bool>> for TypedArray3 {
    fn from(array: Array3<bool>) -> Self {
        Self::from_bool(&array)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn bool_to_u8() {
        let mask = array![[[true, false, true]]];

        assert_eq!(
            TypedArray3::from_bool(&mask),
            TypedArray3::U8(array![[[1, 0, 1]]])
        );
        assert_eq!(TypedArray3::from(mask).data_type(), RasterDataType::U8);
    }

    #[test]
    fn shape_and_type() {
        let array = TypedArray3::from(Array3::<f32>::zeros((2, 3, 4)));

        assert_eq!(array.data_type(), RasterDataType::F32);
        assert_eq!(array.shape(), [2, 3, 4]);
        assert_eq!(array.band_count(), 2);
        assert_eq!(array.grid_shape(), GridShape2D::new([3, 4]).unwrap());
        assert!(array.as_array::<f32>().is_some());
        assert!(array.as_array::<f64>().is_none());
    }

    #[test]
    fn into_array_checks_type() {
        let array = TypedArray3::from(array![[[1_i16, -2]]]);

        assert!(array.clone().into_array::<u8>().is_err());
        assert_eq!(array.into_array::<i16>().unwrap(), array![[[1_i16, -2]]]);
    }

    #[test]
    fn conversion() {
        let array = TypedArray3::from(array![[[1.7_f64, -2.5, 300.0]]]);

        assert_eq!(
            array.convert_to(RasterDataType::U8),
            TypedArray3::U8(array![[[1, 0, 255]]])
        );
        assert_eq!(
            array.convert_to(RasterDataType::I16),
            TypedArray3::I16(array![[[1, -2, 300]]])
        );
    }

    #[test]
    fn trim_margins() {
        let array = TypedArray3::from(Array3::from_shape_fn((1, 4, 5), |(_, y, x)| {
            (y * 10 + x) as u16
        }));

        let trimmed = array
            .trim(Margins {
                top: 1,
                left: 2,
                bottom: 0,
                right: 1,
            })
            .unwrap();

        assert_eq!(
            trimmed,
            TypedArray3::U16(array![[[12, 13], [22, 23], [32, 33]]])
        );

        assert!(array.trim(Margins::uniform(2)).is_err());
    }

    #[test]
    fn assign_window() {
        let mut target = TypedArray3::zeros(RasterDataType::I32, [1, 3, 3]);
        let source = TypedArray3::from(array![[[1_u8, 2], [3, 4]]]);

        target
            .assign_window(PixelWindow::new([1, 1].into(), [2, 2].into()), &source)
            .unwrap();

        assert_eq!(
            target,
            TypedArray3::I32(array![[[0, 0, 0], [0, 1, 2], [0, 3, 4]]])
        );

        assert!(
            target
                .assign_window(PixelWindow::new([2, 2].into(), [2, 2].into()), &source)
                .is_err()
        );
    }

    #[test]
    fn bands() {
        let a = TypedArray3::from(array![[[1_u8, 2]]]);
        let b = TypedArray3::from(array![[[3_u16, 4]], [[5, 6]]]);

        let stacked = TypedArray3::stack_bands(&[a, b]).unwrap();
        assert_eq!(
            stacked,
            TypedArray3::U8(array![[[1, 2]], [[3, 4]], [[5, 6]]])
        );

        assert_eq!(
            stacked.band(2).unwrap(),
            TypedArray3::U8(array![[[5, 6]]])
        );
        assert!(stacked.band(3).is_err());
        assert!(TypedArray3::stack_bands(&[]).is_err());
    }
}
