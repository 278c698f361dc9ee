use std::fs;
use std::path::Path;

use crate::error::{SplatError, SplatResult};
use crate::math::{clamp_u8, pack_rgb, Vec3};
use crate::surfel::{Material, Surfel};

/// Radius used when the file carries none.
pub const DEFAULT_RADIUS: f32 = 0.01;

#[derive(Debug, Clone, Copy)]
enum PlyType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl PlyType {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "char" | "int8" => Some(Self::Char),
            "uchar" | "uint8" => Some(Self::UChar),
            "short" | "int16" => Some(Self::Short),
            "ushort" | "uint16" => Some(Self::UShort),
            "int" | "int32" => Some(Self::Int),
            "uint" | "uint32" => Some(Self::UInt),
            "float" | "float32" => Some(Self::Float),
            "double" | "float64" => Some(Self::Double),
            _ => None,
        }
    }

    fn size(self) -> usize {
        match self {
            Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Double => 8,
        }
    }

    fn read_le(self, bytes: &[u8]) -> f32 {
        match self {
            Self::Char => i8::from_le_bytes([bytes[0]]) as f32,
            Self::UChar => bytes[0] as f32,
            Self::Short => i16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            Self::UShort => u16::from_le_bytes([bytes[0], bytes[1]]) as f32,
            Self::Int => i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            Self::UInt => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32,
            Self::Float => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            Self::Double => {
                let mut arr = [0u8; 8];
                arr.copy_from_slice(&bytes[0..8]);
                f64::from_le_bytes(arr) as f32
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlyFormat {
    Ascii,
    BinaryLittleEndian,
}

#[derive(Debug, Clone)]
struct PlyProperty {
    name: String,
    ty: PlyType,
}

struct PlyHeader {
    format: PlyFormat,
    vertex_count: usize,
    props: Vec<PlyProperty>,
    /// Byte offset of the first vertex.
    body_start: usize,
}

fn ply_error(msg: impl Into<String>) -> SplatError {
    SplatError::Ply(msg.into())
}

fn find_ply_header_end(data: &[u8]) -> Option<usize> {
    let marker = b"end_header";
    let pos = data.windows(marker.len()).position(|w| w == marker)?;
    let mut end = pos + marker.len();
    while end < data.len() && data[end] != b'\n' {
        end += 1;
    }
    if end < data.len() {
        end += 1;
    }
    Some(end)
}

fn parse_header(data: &[u8]) -> SplatResult<PlyHeader> {
    if !data.starts_with(b"ply") {
        return Err(ply_error("missing 'ply' magic"));
    }
    let body_start = find_ply_header_end(data).ok_or_else(|| ply_error("missing end_header"))?;
    let header_text = std::str::from_utf8(&data[..body_start])
        .map_err(|_| ply_error("header is not valid UTF-8"))?;

    let mut format = None;
    let mut vertex_count = 0usize;
    let mut in_vertex_element = false;
    let mut seen_vertex = false;
    let mut props = Vec::new();

    for line in header_text.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            ["format", "ascii", ..] => format = Some(PlyFormat::Ascii),
            ["format", "binary_little_endian", ..] => format = Some(PlyFormat::BinaryLittleEndian),
            ["format", other, ..] => return Err(ply_error(format!("unsupported format '{other}'"))),
            ["element", name, count, ..] => {
                in_vertex_element = *name == "vertex";
                if in_vertex_element {
                    if seen_vertex {
                        return Err(ply_error("duplicate vertex element"));
                    }
                    seen_vertex = true;
                    vertex_count = count
                        .parse::<usize>()
                        .map_err(|_| ply_error(format!("invalid vertex count '{count}'")))?;
                } else if !seen_vertex {
                    // The body is read from its start, so vertices must lead.
                    return Err(ply_error("vertex element must come first"));
                }
            }
            ["property", "list", ..] if in_vertex_element => {
                return Err(ply_error("list properties in vertex element are unsupported"));
            }
            ["property", ty, name, ..] if in_vertex_element => {
                let ty = PlyType::parse(ty)
                    .ok_or_else(|| ply_error(format!("unsupported property type '{ty}'")))?;
                props.push(PlyProperty {
                    name: name.to_string(),
                    ty,
                });
            }
            _ => {}
        }
    }

    let format = format.ok_or_else(|| ply_error("missing format line"))?;
    if vertex_count == 0 || props.is_empty() {
        return Err(ply_error("missing vertex element or properties"));
    }
    Ok(PlyHeader {
        format,
        vertex_count,
        props,
        body_start,
    })
}

/// Collects named vertex fields into a surfel.
#[derive(Default)]
struct SurfelFields {
    position: [f32; 3],
    normal: [f32; 3],
    rgb: Option<[f32; 3]>,
    radius: Option<f32>,
    material: Material,
}

impl SurfelFields {
    fn set(&mut self, name: &str, value: f32) {
        match name {
            "x" => self.position[0] = value,
            "y" => self.position[1] = value,
            "z" => self.position[2] = value,
            "nx" => self.normal[0] = value,
            "ny" => self.normal[1] = value,
            "nz" => self.normal[2] = value,
            "red" | "r" | "diffuse_red" => self.rgb.get_or_insert([220.0; 3])[0] = value,
            "green" | "g" | "diffuse_green" => self.rgb.get_or_insert([220.0; 3])[1] = value,
            "blue" | "b" | "diffuse_blue" => self.rgb.get_or_insert([220.0; 3])[2] = value,
            "radius" => self.radius = Some(value),
            "ka" => self.material.ambient = value,
            "kd" => self.material.diffuse = value,
            "ks" => self.material.specular = value,
            "shininess" => self.material.shininess = value,
            _ => {}
        }
    }

    fn finish(self) -> Surfel {
        let rgb = self.rgb.unwrap_or([220.0; 3]);
        let color = pack_rgb([clamp_u8(rgb[0]), clamp_u8(rgb[1]), clamp_u8(rgb[2])]);
        Surfel::new(
            Vec3::from_array(self.position),
            Vec3::from_array(self.normal).normalize(),
            self.radius.unwrap_or(DEFAULT_RADIUS),
            color,
        )
        .with_material(self.material)
    }
}

fn check_required(props: &[PlyProperty]) -> SplatResult<bool> {
    let has = |name: &str| props.iter().any(|p| p.name == name);
    for required in ["x", "y", "z", "nx", "ny", "nz"] {
        if !has(required) {
            return Err(ply_error(format!("missing required vertex property '{required}'")));
        }
    }
    Ok(has("radius"))
}

fn parse_binary(data: &[u8], header: &PlyHeader) -> SplatResult<Vec<Surfel>> {
    let stride: usize = header.props.iter().map(|p| p.ty.size()).sum();
    let needed = header
        .vertex_count
        .checked_mul(stride)
        .and_then(|bytes| bytes.checked_add(header.body_start))
        .ok_or_else(|| ply_error("size overflow computing buffer size"))?;
    if data.len() < needed {
        return Err(ply_error(format!(
            "file truncated (need {needed} bytes, have {})",
            data.len()
        )));
    }

    let body = &data[header.body_start..needed];
    let surfels = body
        .chunks_exact(stride)
        .map(|chunk| {
            let mut fields = SurfelFields::default();
            let mut cursor = 0;
            for prop in &header.props {
                let end = cursor + prop.ty.size();
                fields.set(&prop.name, prop.ty.read_le(&chunk[cursor..end]));
                cursor = end;
            }
            fields.finish()
        })
        .collect();
    Ok(surfels)
}

fn parse_ascii(data: &[u8], header: &PlyHeader) -> SplatResult<Vec<Surfel>> {
    let body = std::str::from_utf8(&data[header.body_start..])
        .map_err(|_| ply_error("body is not valid UTF-8"))?;
    let mut lines = body.lines().filter(|l| !l.trim().is_empty());
    let mut surfels = Vec::with_capacity(header.vertex_count);

    for i in 0..header.vertex_count {
        let line = lines
            .next()
            .ok_or_else(|| ply_error(format!("file truncated at vertex {i}")))?;
        let values: Vec<&str> = line.split_whitespace().collect();
        if values.len() < header.props.len() {
            return Err(ply_error(format!(
                "vertex {i} has {} values, expected {}",
                values.len(),
                header.props.len()
            )));
        }
        let mut fields = SurfelFields::default();
        for (prop, raw) in header.props.iter().zip(&values) {
            let value = raw
                .parse::<f32>()
                .map_err(|_| ply_error(format!("vertex {i}: invalid number '{raw}'")))?;
            fields.set(&prop.name, value);
        }
        surfels.push(fields.finish());
    }
    Ok(surfels)
}

/// Parses a surfel PLY: vertex properties `x y z nx ny nz`, optional
/// `red green blue radius ka kd ks shininess`.
pub fn parse_ply(data: &[u8]) -> SplatResult<Vec<Surfel>> {
    let header = parse_header(data)?;
    let has_radius = check_required(&header.props)?;
    if !has_radius {
        tracing::warn!("PLY has no radius property, using {}", DEFAULT_RADIUS);
    }
    let surfels = match header.format {
        PlyFormat::BinaryLittleEndian => parse_binary(data, &header)?,
        PlyFormat::Ascii => parse_ascii(data, &header)?,
    };
    tracing::info!("parsed {} surfels ({:?})", surfels.len(), header.format);
    Ok(surfels)
}

pub fn load_ply_file(path: &Path) -> SplatResult<Vec<Surfel>> {
    let data = fs::read(path)?;
    parse_ply(&data).map_err(|err| match err {
        SplatError::Ply(msg) => SplatError::Ply(format!("{}: {msg}", path.display())),
        other => other,
    })
}
