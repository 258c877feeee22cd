//! Native ENVI driver: a raw binary file plus a `.hdr` text header

use super::dataset::{CategoryColor, RasterDataset, RasterProperties};
use super::driver::{Interleave, RasterDriver, creation_option, envi_header_path};
use super::metadata::{ENVI_DOMAIN, MetadataValue};
use crate::error;
use crate::util::Result;
use applier_datatypes::{call_typed_array3, generate_typed_array3};
use applier_datatypes::primitives::{Coordinate2D, SpatialResolution};
use applier_datatypes::raster::{
    Grid, GridShape2D, PixelCodec, PixelWindow, RasterDataType, TypedArray3,
};
use applier_datatypes::spatial_reference::SpatialReference;
use byteorder::{BigEndian, LittleEndian};
use ndarray::Array3;
use snafu::{ResultExt, ensure};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Well known keys in the order they are written
const KEY_ORDER: [&str; 23] = [
    "description",
    "samples",
    "lines",
    "bands",
    "header offset",
    "file type",
    "data type",
    "interleave",
    "data ignore value",
    "band data ignore values",
    "sensor type",
    "byte order",
    "map info",
    "projection info",
    "coordinate system string",
    "acquisition time",
    "wavelength units",
    "wavelength",
    "fwhm",
    "band names",
    "classes",
    "class lookup",
    "class names",
];

/// Keys derived from the raster properties, not exposed as metadata items
const STRUCTURAL_KEYS: [&str; 16] = [
    "samples",
    "lines",
    "bands",
    "header offset",
    "file type",
    "data type",
    "interleave",
    "byte order",
    "map info",
    "coordinate system string",
    "data ignore value",
    "band data ignore values",
    "band names",
    "classes",
    "class lookup",
    "class names",
];

/// Marks bands without a no-data value in `band data ignore values`
const NO_VALUE: &str = "none";

const GEOGRAPHIC_PROJECTION: &str = "Geographic Lat/Lon";

/// The key value pairs of an ENVI header, keys in lower case
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EnviHeader {
    entries: Vec<(String, String)>,
}

impl EnviHeader {
    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).context(error::Io { path })?;
        Self::parse(&text, path)
    }

    /// Parses header text, values in braces may span multiple lines
    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let mut lines = text.lines();

        ensure!(
            lines.by_ref().find(|l| !l.trim().is_empty()).map(str::trim) == Some("ENVI"),
            error::InvalidEnviHeader {
                path,
                reason: "the header must start with `ENVI`",
            }
        );

        let mut header = Self::default();
        while let Some(line) = lines.next() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };

            let mut value = value.trim().to_string();
            if value.starts_with('{') {
                while !value.contains('}') {
                    let Some(continuation) = lines.next() else {
                        return Err(error::Error::InvalidEnviHeader {
                            path: path.to_path_buf(),
                            reason: format!("unterminated value of `{}`", key.trim()),
                        });
                    };
                    value.push(' ');
                    value.push_str(continuation.trim());
                }
            }

            header.set(key, value);
        }

        Ok(header)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        let key = key.trim().to_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let key = key.trim().to_lowercase();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// The header text with well known keys first
    pub fn to_text(&self) -> String {
        let mut entries: Vec<&(String, String)> = self.entries.iter().collect();
        entries.sort_by_key(|(key, _)| {
            KEY_ORDER
                .iter()
                .position(|known| known == key)
                .unwrap_or(KEY_ORDER.len())
        });

        let mut text = String::from("ENVI\n");
        for (key, value) in entries {
            text.push_str(key);
            text.push_str(" = ");
            text.push_str(value);
            text.push('\n');
        }
        text
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_text()).context(error::Io { path })
    }

    fn required<T: std::str::FromStr>(&self, key: &str, path: &Path) -> Result<T> {
        let value = self.get(key).ok_or_else(|| error::Error::MissingHeaderField {
            path: path.to_path_buf(),
            field: key.to_string(),
        })?;

        value
            .trim()
            .parse()
            .map_err(|_| error::Error::InvalidEnviHeader {
                path: path.to_path_buf(),
                reason: format!("invalid value `{value}` of `{key}`"),
            })
    }

    fn optional<T: std::str::FromStr>(&self, key: &str, path: &Path) -> Result<Option<T>> {
        match self.get(key) {
            Some(_) => self.required(key, path).map(Some),
            None => Ok(None),
        }
    }
}

/// Layout of the binary file
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Layout {
    interleave: Interleave,
    big_endian: bool,
    header_offset: u64,
}

#[derive(Debug)]
pub struct EnviDataset {
    path: PathBuf,
    header_path: PathBuf,
    header: EnviHeader,
    properties: RasterProperties,
    layout: Layout,
}

/// Opens an existing ENVI raster
pub fn open(path: &Path) -> Result<EnviDataset> {
    let header_path = find_header(path)?;
    let header = EnviHeader::read(&header_path)?;

    let properties = properties_from_header(&header, &header_path)?;

    let interleave = match header.get("interleave") {
        Some(interleave) => {
            interleave
                .trim()
                .parse()
                .map_err(|_| error::Error::InvalidEnviHeader {
                    path: header_path.clone(),
                    reason: format!("unknown interleave `{interleave}`"),
                })?
        }
        None => Interleave::Bsq,
    };
    let layout = Layout {
        interleave,
        big_endian: header.optional::<u8>("byte order", &header_path)? == Some(1),
        header_offset: header
            .optional("header offset", &header_path)?
            .unwrap_or_default(),
    };

    debug!(path = %path.display(), ?interleave, "opened ENVI raster");

    Ok(EnviDataset {
        path: path.to_path_buf(),
        header_path,
        header,
        properties,
        layout,
    })
}

/// Creates a zero filled ENVI raster and its header.
/// An `INTERLEAVE` creation option overrides `interleave`.
pub fn create(
    path: &Path,
    interleave: Interleave,
    properties: RasterProperties,
    creation_options: &[String],
) -> Result<EnviDataset> {
    let interleave = creation_option(creation_options, "INTERLEAVE")
        .and_then(|i| i.parse().ok())
        .unwrap_or(interleave);

    ensure!(
        properties.data_type.envi_code().is_some(),
        error::UnsupportedDataType {
            driver: "ENVI",
            data_type: properties.data_type,
        }
    );

    let element_size = properties.data_type.size_in_bytes() as u64;
    let [bands, rows, columns] = properties.array_shape();

    let file = File::create(path).context(error::Io { path })?;
    file.set_len(bands as u64 * rows as u64 * columns as u64 * element_size)
        .context(error::Io { path })?;

    let mut dataset = EnviDataset {
        path: path.to_path_buf(),
        header_path: envi_header_path(path),
        header: EnviHeader::default(),
        properties,
        layout: Layout {
            interleave,
            big_endian: false,
            header_offset: 0,
        },
    };
    dataset.flush()?;

    debug!(path = %path.display(), ?interleave, "created ENVI raster");

    Ok(dataset)
}

/// Writes an ENVI header next to a raster of another format, so that ENVI
/// software finds its metadata
pub fn write_sidecar_header(
    raster_path: &Path,
    properties: &RasterProperties,
    file_type: &str,
) -> Result<()> {
    let layout = Layout {
        interleave: Interleave::Bsq,
        big_endian: false,
        header_offset: 0,
    };
    let header = header_from_properties(raster_path, properties, layout, file_type)?;
    header.write(&envi_header_path(raster_path))
}

impl EnviDataset {
    pub fn header(&self) -> &EnviHeader {
        &self.header
    }

    pub fn interleave(&self) -> Interleave {
        self.layout.interleave
    }

    /// Byte offsets and element counts of the contiguous runs of `window` in file order
    fn segments(&self, window: PixelWindow) -> Vec<(u64, usize)> {
        let [bands, lines, samples] = self.properties.array_shape();
        let size = self.properties.data_type.size_in_bytes();
        let (y0, y1) = (window.offset.y() as usize, window.end_y() as usize);
        let x0 = window.offset.x() as usize;
        let columns = window.shape.axis_size_x();

        let offset = |element: usize| self.layout.header_offset + (element * size) as u64;

        match self.layout.interleave {
            Interleave::Bsq => (0..bands)
                .flat_map(|b| (y0..y1).map(move |y| (b, y)))
                .map(|(b, y)| (offset((b * lines + y) * samples + x0), columns))
                .collect(),
            Interleave::Bil => (y0..y1)
                .flat_map(|y| (0..bands).map(move |b| (y, b)))
                .map(|(y, b)| (offset((y * bands + b) * samples + x0), columns))
                .collect(),
            Interleave::Bip => (y0..y1)
                .map(|y| (offset((y * samples + x0) * bands), columns * bands))
                .collect(),
        }
    }

    /// Shape of a window in file order and the axes mapping it to `[bands, rows, columns]`
    fn file_order(&self, window: PixelWindow) -> ([usize; 3], [usize; 3]) {
        let bands = self.properties.band_count();
        let (rows, columns) = (window.shape.axis_size_y(), window.shape.axis_size_x());

        match self.layout.interleave {
            Interleave::Bsq => ([bands, rows, columns], [0, 1, 2]),
            Interleave::Bil => ([rows, bands, columns], [1, 0, 2]),
            Interleave::Bip => ([rows, columns, bands], [2, 0, 1]),
        }
    }

    fn ensure_readable(&self, window: PixelWindow) -> Result<()> {
        if window.is_inside(self.properties.grid.shape()) {
            Ok(())
        } else {
            Err(applier_datatypes::error::Error::OutOfBounds {
                window,
                shape: self.properties.grid.shape(),
            }
            .into())
        }
    }
}

impl RasterDataset for EnviDataset {
    fn path(&self) -> &Path {
        &self.path
    }

    fn driver(&self) -> RasterDriver {
        RasterDriver::Envi(self.layout.interleave)
    }

    fn properties(&self) -> &RasterProperties {
        &self.properties
    }

    fn properties_mut(&mut self) -> &mut RasterProperties {
        &mut self.properties
    }

    fn read_window(&self, window: PixelWindow) -> Result<TypedArray3> {
        self.ensure_readable(window)?;

        let size = self.properties.data_type.size_in_bytes();
        let segments = self.segments(window);
        let total: usize = segments.iter().map(|(_, count)| count).sum();

        let mut file = File::open(&self.path).context(error::Io { path: &self.path })?;
        let mut bytes = vec![0_u8; total * size];
        let mut position = 0;
        for (offset, count) in segments {
            let length = count * size;
            file.seek(SeekFrom::Start(offset))
                .and_then(|_| file.read_exact(&mut bytes[position..position + length]))
                .context(error::Io { path: &self.path })?;
            position += length;
        }

        let (shape, axes) = self.file_order(window);
        let big_endian = self.layout.big_endian;

        Ok(generate_typed_array3!(self.properties.data_type, T => {
            let values = if big_endian {
                T::decode::<BigEndian>(&bytes)
            } else {
                T::decode::<LittleEndian>(&bytes)
            };
            Array3::from_shape_vec(shape, values)
                .map_err(|_| error::Error::WindowShapeMismatch { window, found: shape })?
                .permuted_axes(axes)
                .as_standard_layout()
                .into_owned()
        }))
    }

    fn write_window(&mut self, window: PixelWindow, array: &TypedArray3) -> Result<()> {
        self.ensure_writable(window, array)?;

        let array = array.convert_to(self.properties.data_type);
        let size = self.properties.data_type.size_in_bytes();
        let big_endian = self.layout.big_endian;

        // inverse of the axes used for reading
        let axes = match self.layout.interleave {
            Interleave::Bsq => [0, 1, 2],
            Interleave::Bil => [1, 0, 2],
            Interleave::Bip => [1, 2, 0],
        };

        let mut bytes = Vec::with_capacity(array.shape().iter().product::<usize>() * size);
        call_typed_array3!(&array, pixels => {
            let values: Vec<_> = pixels.view().permuted_axes(axes).iter().copied().collect();
            if big_endian {
                PixelCodec::encode::<BigEndian>(&values, &mut bytes);
            } else {
                PixelCodec::encode::<LittleEndian>(&values, &mut bytes);
            }
        });

        let mut file = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .context(error::Io { path: &self.path })?;

        let mut position = 0;
        for (offset, count) in self.segments(window) {
            let length = count * size;
            file.seek(SeekFrom::Start(offset))
                .and_then(|_| file.write_all(&bytes[position..position + length]))
                .context(error::Io { path: &self.path })?;
            position += length;
        }

        Ok(())
    }

    /// Rewrites the header from the current properties
    fn flush(&mut self) -> Result<()> {
        let header =
            header_from_properties(&self.path, &self.properties, self.layout, "ENVI Standard")?;
        header.write(&self.header_path)?;
        self.header = header;
        Ok(())
    }
}

/// `file.hdr` or `file.ext.hdr`
fn find_header(path: &Path) -> Result<PathBuf> {
    let replaced = envi_header_path(path);
    if replaced.is_file() {
        return Ok(replaced);
    }

    let mut appended = path.as_os_str().to_owned();
    appended.push(".hdr");
    let appended = PathBuf::from(appended);
    if appended.is_file() {
        return Ok(appended);
    }

    Err(error::Error::DatasetNotFound { path: replaced })
}

fn properties_from_header(header: &EnviHeader, path: &Path) -> Result<RasterProperties> {
    let samples: usize = header.required("samples", path)?;
    let lines: usize = header.required("lines", path)?;
    let bands: usize = header.required("bands", path)?;
    let data_type = RasterDataType::from_envi_code(header.required("data type", path)?)?;

    let shape = GridShape2D::new([lines, samples])?;
    let (upper_left, resolution, projection_name) = match header.get("map info") {
        Some(map_info) => parse_map_info(map_info, path)?,
        None => ((0., 0.).into(), SpatialResolution::one(), None),
    };

    let spatial_reference = match (header.get("coordinate system string"), projection_name) {
        (Some(wkt), _) => {
            let wkt = wkt.trim();
            let wkt = wkt
                .strip_prefix('{')
                .and_then(|inner| inner.strip_suffix('}'))
                .unwrap_or(wkt);
            SpatialReference::from_wkt(wkt)?
        }
        (None, Some(name)) if name.starts_with(GEOGRAPHIC_PROJECTION) => SpatialReference::wgs84(),
        (None, Some(name)) => SpatialReference::local(&name),
        (None, None) => SpatialReference::local("unknown"),
    };

    let grid = Grid::new(upper_left, resolution, shape, spatial_reference)?;
    let mut properties = RasterProperties::new(grid, data_type, bands);

    for (key, value) in header.entries() {
        if !STRUCTURAL_KEYS.contains(&key) {
            properties
                .metadata
                .set_item(key, MetadataValue::parse_envi(value), ENVI_DOMAIN);
        }
    }

    match (header.get("band data ignore values"), header.get("data ignore value")) {
        (Some(values), _) => {
            let values = MetadataValue::parse_envi(values).as_string_list();
            for (band, value) in properties.bands.iter_mut().zip(values) {
                band.no_data_value = value.trim().parse().ok();
            }
        }
        (None, Some(value)) => {
            let no_data_value = MetadataValue::parse_envi(value).as_f64();
            for band in &mut properties.bands {
                band.no_data_value = no_data_value;
            }
        }
        (None, None) => {}
    }

    if let Some(names) = header.get("band names") {
        let names = MetadataValue::parse_envi(names).as_string_list();
        for (band, name) in properties.bands.iter_mut().zip(names) {
            band.description = Some(name);
        }
    }

    if let Some(band) = properties.bands.first_mut() {
        if let Some(names) = header.get("class names") {
            band.category_names = Some(MetadataValue::parse_envi(names).as_string_list());
        }
        if let Some(lookup) = header.get("class lookup") {
            band.category_colors = Some(parse_class_lookup(lookup, path)?);
        }
    }

    Ok(properties)
}

/// RGB triples of a `class lookup` value
fn parse_class_lookup(lookup: &str, path: &Path) -> Result<Vec<CategoryColor>> {
    let invalid = || error::Error::InvalidEnviHeader {
        path: path.to_path_buf(),
        reason: format!("invalid class lookup `{lookup}`"),
    };

    let values = MetadataValue::parse_envi(lookup)
        .as_f64_list()
        .filter(|values| values.len() % 3 == 0)
        .ok_or_else(invalid)?;

    values
        .chunks_exact(3)
        .map(|rgb| {
            let mut color = [0; 3];
            for (channel, &value) in color.iter_mut().zip(rgb) {
                if !(0. ..=255.).contains(&value) {
                    return Err(invalid());
                }
                *channel = value as u8;
            }
            Ok(color)
        })
        .collect()
}

/// Upper left corner, resolution and projection name of a `map info` value
fn parse_map_info(
    map_info: &str,
    path: &Path,
) -> Result<(Coordinate2D, SpatialResolution, Option<String>)> {
    let items = MetadataValue::parse_envi(map_info).as_string_list();
    let numbers: Option<Vec<f64>> = items
        .get(1..7)
        .and_then(|numbers| numbers.iter().map(|n| n.trim().parse().ok()).collect());

    let Some(&[pixel_x, pixel_y, x, y, resolution_x, resolution_y]) = numbers.as_deref() else {
        return Err(error::Error::InvalidEnviHeader {
            path: path.to_path_buf(),
            reason: format!("invalid map info `{map_info}`"),
        });
    };

    // the reference pixel is one-based
    let upper_left = Coordinate2D::new(
        x - (pixel_x - 1.) * resolution_x,
        y + (pixel_y - 1.) * resolution_y,
    );

    Ok((
        upper_left,
        SpatialResolution::new(resolution_x, resolution_y)?,
        items.first().cloned(),
    ))
}

/// Builds a header from the `ENVI` metadata domain and the values of `properties`
fn header_from_properties(
    path: &Path,
    properties: &RasterProperties,
    layout: Layout,
    file_type: &str,
) -> Result<EnviHeader> {
    let data_type = properties.data_type;
    let data_type_code = data_type.envi_code().ok_or(error::Error::UnsupportedDataType {
        driver: "ENVI".to_string(),
        data_type,
    })?;

    let mut header = EnviHeader::default();

    if let Some(items) = properties.metadata.domain(ENVI_DOMAIN) {
        for (key, value) in items {
            header.set(key, value.to_envi_string());
        }
    }

    if header.get("description").is_none() {
        let name = path.file_name().unwrap_or_default().to_string_lossy();
        header.set("description", format!("{{{name}}}"));
    }

    let [bands, lines, samples] = properties.array_shape();
    header.set("samples", samples.to_string());
    header.set("lines", lines.to_string());
    header.set("bands", bands.to_string());
    header.set("header offset", layout.header_offset.to_string());
    header.set("file type", file_type);
    header.set("data type", data_type_code.to_string());
    header.set("interleave", layout.interleave.to_string());
    header.set("byte order", if layout.big_endian { "1" } else { "0" });

    let grid = &properties.grid;
    let upper_left = grid.upper_left();
    let resolution = grid.resolution();
    let spatial_reference = grid.spatial_reference();
    let map_info = if *spatial_reference == SpatialReference::wgs84() {
        format!(
            "{{{GEOGRAPHIC_PROJECTION}, 1, 1, {}, {}, {}, {}, WGS-84}}",
            upper_left.x, upper_left.y, resolution.x, resolution.y
        )
    } else {
        format!(
            "{{{}, 1, 1, {}, {}, {}, {}}}",
            spatial_reference.name().unwrap_or("Arbitrary"),
            upper_left.x,
            upper_left.y,
            resolution.x,
            resolution.y
        )
    };
    header.set("map info", map_info);
    header.set(
        "coordinate system string",
        format!("{{{}}}", spatial_reference.wkt()),
    );

    let no_data_values: Vec<Option<f64>> =
        properties.bands.iter().map(|band| band.no_data_value).collect();
    match no_data_values.as_slice() {
        [Some(first), rest @ ..]
            if rest.iter().all(|value| value.map(f64::to_bits) == Some(first.to_bits())) =>
        {
            header.set("data ignore value", first.to_string());
        }
        values if values.iter().any(Option::is_some) => {
            let values: Vec<String> = values
                .iter()
                .map(|value| value.map_or_else(|| NO_VALUE.to_string(), |v| v.to_string()))
                .collect();
            header.set(
                "band data ignore values",
                MetadataValue::from(values).to_envi_string(),
            );
        }
        _ => {}
    }

    if properties.bands.iter().any(|b| b.description.is_some()) {
        let names = properties
            .bands
            .iter()
            .enumerate()
            .map(|(index, band)| {
                band.description
                    .clone()
                    .unwrap_or_else(|| format!("Band {}", index + 1))
            })
            .collect::<Vec<_>>();
        header.set("band names", MetadataValue::from(names).to_envi_string());
    }

    if let Some(band) = properties.bands.first() {
        if let Some(names) = &band.category_names {
            header.set("classes", names.len().to_string());
            header.set("class names", MetadataValue::from(names.clone()).to_envi_string());
        }
        if let Some(colors) = &band.category_colors {
            if band.category_names.is_none() {
                header.set("classes", colors.len().to_string());
            }
            let lookup: Vec<f64> = colors.iter().flatten().map(|&c| f64::from(c)).collect();
            header.set("class lookup", MetadataValue::from(lookup).to_envi_string());
        }
    }

    Ok(header)
}
