use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::str::FromStr;

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::tga::TgaEncoder;
use image::{DynamicImage, ImageEncoder, ImageError, RgbaImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::canvas::{
    BlendMode, CHUNK_SIZE, CanvasState, DEFAULT_RESOLUTION, Layer, MAX_CANVAS_DIM, MAX_RESOLUTION, TextLayer, TiledImage,
};
use crate::host::{LayerId, TextItem};

// ============================================================================
// OUTPUT FORMATS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SaveFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
    Bmp,
    Tga,
    Tiff,
    /// Native layered project.
    Smk,
}

impl SaveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SaveFormat::Png => "png",
            SaveFormat::Jpeg => "jpg",
            SaveFormat::Webp => "webp",
            SaveFormat::Bmp => "bmp",
            SaveFormat::Tga => "tga",
            SaveFormat::Tiff => "tiff",
            SaveFormat::Smk => "smk",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(SaveFormat::Png),
            "jpg" | "jpeg" => Some(SaveFormat::Jpeg),
            "webp" => Some(SaveFormat::Webp),
            "bmp" => Some(SaveFormat::Bmp),
            "tga" => Some(SaveFormat::Tga),
            "tif" | "tiff" => Some(SaveFormat::Tiff),
            "smk" => Some(SaveFormat::Smk),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    pub fn supports_quality(&self) -> bool {
        matches!(self, SaveFormat::Jpeg)
    }
}

impl FromStr for SaveFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s.trim()).ok_or_else(|| {
            format!(
                "unknown format '{}'. Valid values: png, jpg, webp, bmp, tga, tiff, smk",
                s
            )
        })
    }
}

/// Compression options for TIFF format
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TiffCompression {
    #[default]
    None,
    Lzw,
    Deflate,
}

impl FromStr for TiffCompression {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(TiffCompression::None),
            "lzw" => Ok(TiffCompression::Lzw),
            "deflate" | "zip" => Ok(TiffCompression::Deflate),
            other => Err(format!(
                "unknown TIFF compression '{}'. Valid values: none, lzw, deflate",
                other
            )),
        }
    }
}

// ============================================================================
// SMK PROJECT FILE FORMAT
// ============================================================================

/// Magic header of the tiled sparse project format
const SMK_MAGIC: &str = "SMK1";

/// Maximum number of layers in a project file.
const MAX_LAYERS: usize = 256;

/// Serializable project file: sparse tiled layers
#[derive(Serialize, Deserialize)]
pub struct ProjectFile {
    magic: String,
    width: u32,
    height: u32,
    resolution: f64,
    active_layer_index: usize,
    layers: Vec<LayerData>,
}

#[derive(Serialize, Deserialize)]
struct LayerData {
    id: LayerId,
    name: String,
    visible: bool,
    opacity: f32,
    blend_mode: u8,
    chunks: Vec<ChunkData>,
    text: Option<TextData>,
}

/// A single serialisable chunk (64×64 × 4 bytes = 16 384 bytes of pixel data)
#[derive(Serialize, Deserialize)]
struct ChunkData {
    cx: u32,
    cy: u32,
    pixels: Vec<u8>,
}

/// Live point text carried by a layer.
#[derive(Serialize, Deserialize)]
struct TextData {
    item: TextItem,
    size_px: f64,
    origin_x: f64,
    origin_y: f64,
}

/// Error type for document file operations
#[derive(Error, Debug)]
pub enum ProjectError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] bincode::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Unsupported file type: {0}")]
    Unsupported(String),
}

/// Save a CanvasState as a .smk project file
pub fn save_project(state: &CanvasState, path: &Path) -> Result<(), ProjectError> {
    let project = build_project_file(state);
    let writer = BufWriter::new(File::create(path)?);
    bincode::serialize_into(writer, &project)?;
    tracing::info!(path = %path.display(), layers = state.layers.len(), "saved project");
    Ok(())
}

/// Build the serializable project data from canvas state.
pub fn build_project_file(state: &CanvasState) -> ProjectFile {
    let layers = state
        .layers
        .iter()
        .map(|layer| {
            let chunks = layer
                .pixels
                .chunk_keys()
                .filter_map(|(cx, cy)| {
                    layer.pixels.get_chunk(cx, cy).map(|chunk| ChunkData {
                        cx,
                        cy,
                        pixels: chunk.as_raw().clone(),
                    })
                })
                .collect();

            LayerData {
                id: layer.id,
                name: layer.name.clone(),
                visible: layer.visible,
                opacity: layer.opacity,
                blend_mode: layer.blend_mode.to_u8(),
                chunks,
                text: layer.text.as_ref().map(|t| TextData {
                    item: t.item.clone(),
                    size_px: t.size_px,
                    origin_x: t.origin.0,
                    origin_y: t.origin.1,
                }),
            }
        })
        .collect();

    ProjectFile {
        magic: SMK_MAGIC.to_string(),
        width: state.width,
        height: state.height,
        resolution: state.resolution,
        active_layer_index: state.active_layer_index,
        layers,
    }
}

/// Load a .smk project file
pub fn load_project(path: &Path) -> Result<CanvasState, ProjectError> {
    let raw = std::fs::read(path)?;
    if raw.len() < 12 {
        return Err(ProjectError::InvalidFormat("File too small".into()));
    }

    // bincode encodes a String as: 8-byte length prefix + UTF-8 data.
    // The magic is 4 chars, so bytes 8..12 hold it.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != SMK_MAGIC {
        return Err(ProjectError::InvalidFormat(format!("Unknown magic '{}'", magic)));
    }

    let project: ProjectFile = bincode::deserialize(&raw)?;
    project_into_canvas(project)
}

fn project_into_canvas(project: ProjectFile) -> Result<CanvasState, ProjectError> {
    if project.width == 0 || project.height == 0 {
        return Err(ProjectError::InvalidFormat("Canvas dimensions cannot be zero".into()));
    }
    if project.width > MAX_CANVAS_DIM || project.height > MAX_CANVAS_DIM {
        return Err(ProjectError::InvalidFormat(format!(
            "Canvas size {}x{} exceeds maximum allowed {}x{}",
            project.width, project.height, MAX_CANVAS_DIM, MAX_CANVAS_DIM
        )));
    }
    if project.layers.len() > MAX_LAYERS {
        return Err(ProjectError::InvalidFormat(format!(
            "Project contains {} layers, which exceeds the maximum of {}",
            project.layers.len(),
            MAX_LAYERS
        )));
    }
    if project.layers.is_empty() {
        return Err(ProjectError::InvalidFormat("Project contains no layers".into()));
    }
    let resolution = if project.resolution > 0.0 && project.resolution <= MAX_RESOLUTION {
        project.resolution
    } else {
        tracing::warn!(resolution = project.resolution, "invalid stored resolution, using default");
        DEFAULT_RESOLUTION
    };

    let expected_chunk_bytes = (CHUNK_SIZE * CHUNK_SIZE * 4) as usize;
    let chunks_x = project.width.div_ceil(CHUNK_SIZE);
    let chunks_y = project.height.div_ceil(CHUNK_SIZE);

    let mut layers = Vec::with_capacity(project.layers.len());
    for ld in project.layers {
        let mut tiled = TiledImage::new(project.width, project.height);
        for cd in ld.chunks {
            if cd.cx >= chunks_x || cd.cy >= chunks_y {
                return Err(ProjectError::InvalidFormat(format!(
                    "Chunk ({},{}) in layer '{}' lies outside the canvas",
                    cd.cx, cd.cy, ld.name
                )));
            }
            if cd.pixels.len() != expected_chunk_bytes {
                return Err(ProjectError::InvalidFormat(format!(
                    "Chunk ({},{}) in layer '{}' has {} bytes, expected {}",
                    cd.cx,
                    cd.cy,
                    ld.name,
                    cd.pixels.len(),
                    expected_chunk_bytes,
                )));
            }
            let chunk_img = RgbaImage::from_raw(CHUNK_SIZE, CHUNK_SIZE, cd.pixels).ok_or_else(|| {
                ProjectError::InvalidFormat(format!(
                    "Failed to reconstruct chunk ({},{}) for layer '{}'",
                    cd.cx, cd.cy, ld.name
                ))
            })?;
            tiled.set_chunk(cd.cx, cd.cy, chunk_img);
        }

        layers.push(Layer {
            id: ld.id,
            name: ld.name,
            visible: ld.visible,
            opacity: ld.opacity.clamp(0.0, 1.0),
            blend_mode: BlendMode::from_u8(ld.blend_mode),
            pixels: tiled,
            text: ld.text.map(|t| TextLayer {
                item: t.item,
                size_px: t.size_px,
                origin: (t.origin_x, t.origin_y),
            }),
        });
    }

    let active = project.active_layer_index.min(layers.len() - 1);

    Ok(CanvasState {
        layers,
        active_layer_index: active,
        width: project.width,
        height: project.height,
        resolution,
        selection_mask: None,
    })
}

// ============================================================================
// SYNCHRONOUS LOAD / SAVE (CLI / headless mode)
// ============================================================================

/// Synchronously load a document.
///
/// - `.smk`: native project (layers preserved)
/// - All raster formats supported by the `image` crate (PNG, JPEG, WEBP, BMP,
///   TGA, TIFF): loaded as a single layer at the default resolution
pub fn load_image(path: &Path) -> Result<CanvasState, ProjectError> {
    if SaveFormat::from_path(path) == Some(SaveFormat::Smk) {
        return load_project(path);
    }

    let img = image::open(path)?.to_rgba8();
    if img.width() > MAX_CANVAS_DIM || img.height() > MAX_CANVAS_DIM {
        return Err(ProjectError::InvalidFormat(format!(
            "Image size {}x{} exceeds maximum allowed {}x{}",
            img.width(),
            img.height(),
            MAX_CANVAS_DIM,
            MAX_CANVAS_DIM
        )));
    }
    let name = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("Background");
    tracing::debug!(path = %path.display(), width = img.width(), height = img.height(), "decoded image");
    Ok(CanvasState::from_image(&img, name))
}

/// Save a document: `.smk` keeps layers, every other format is flattened.
pub fn save_canvas(
    state: &CanvasState,
    path: &Path,
    format: SaveFormat,
    quality: u8,
    tiff_compression: TiffCompression,
) -> Result<(), ProjectError> {
    if format == SaveFormat::Smk {
        return save_project(state, path);
    }
    let flat = state.composite();
    encode_and_write(&flat, path, format, quality, tiff_compression)?;
    tracing::info!(path = %path.display(), ?format, "saved image");
    Ok(())
}

/// Encode and write a flattened image to a file.
pub fn encode_and_write(
    image: &RgbaImage,
    path: &Path,
    format: SaveFormat,
    quality: u8,
    tiff_compression: TiffCompression,
) -> Result<(), ProjectError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    match format {
        SaveFormat::Png => {
            PngEncoder::new(&mut writer).write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Jpeg => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut writer, quality.clamp(1, 100));
            encoder.encode(
                rgb_image.as_raw(),
                rgb_image.width(),
                rgb_image.height(),
                image::ColorType::Rgb8,
            )?;
        }
        SaveFormat::Webp => {
            drop(writer);
            DynamicImage::ImageRgba8(image.clone()).save_with_format(path, image::ImageFormat::WebP)?;
        }
        SaveFormat::Bmp => {
            let mut encoder = BmpEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tga => {
            let encoder = TgaEncoder::new(&mut writer);
            encoder.encode(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::Rgba8,
            )?;
        }
        SaveFormat::Tiff => {
            let err_map = |e: tiff::TiffError| {
                ImageError::IoError(std::io::Error::other(format!("TIFF encode error: {}", e)))
            };
            let mut tiff_enc = tiff::encoder::TiffEncoder::new(&mut writer).map_err(err_map)?;
            match tiff_compression {
                TiffCompression::None => {
                    tiff_enc
                        .write_image::<tiff::encoder::colortype::RGBA8>(
                            image.width(),
                            image.height(),
                            image.as_raw(),
                        )
                        .map_err(err_map)?;
                }
                TiffCompression::Lzw => {
                    tiff_enc
                        .write_image_with_compression::<tiff::encoder::colortype::RGBA8, _>(
                            image.width(),
                            image.height(),
                            tiff::encoder::compression::Lzw,
                            image.as_raw(),
                        )
                        .map_err(err_map)?;
                }
                TiffCompression::Deflate => {
                    tiff_enc
                        .write_image_with_compression::<tiff::encoder::colortype::RGBA8, _>(
                            image.width(),
                            image.height(),
                            tiff::encoder::compression::Deflate::default(),
                            image.as_raw(),
                        )
                        .map_err(err_map)?;
                }
            }
        }
        SaveFormat::Smk => {
            return Err(ProjectError::Unsupported(
                "layered projects are written with save_project".into(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::Justification;
    use image::Rgba;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn sample_canvas() -> CanvasState {
        let mut canvas = CanvasState::new(130, 70);
        canvas.resolution = 300.0;
        let mut mark = Layer::new("W 130\u{200A}px".into(), 130, 70, Rgba([0, 0, 0, 0]));
        mark.pixels.put_pixel(129, 69, Rgba([0, 0, 0, 255]));
        mark.opacity = 0.65;
        canvas.insert_above_active(mark);

        let mut text = Layer::new("label".into(), 130, 70, Rgba([0, 0, 0, 0]));
        text.text = Some(TextLayer {
            item: TextItem {
                contents: "1.25\u{200A}in".into(),
                justification: Justification::Center,
                optical_kerning: true,
                ..TextItem::default()
            },
            size_px: 50.0,
            origin: (65.0, -25.0),
        });
        canvas.insert_above_active(text);
        canvas
    }

    #[test]
    fn project_round_trip_keeps_layers_and_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.smk");
        let canvas = sample_canvas();
        save_project(&canvas, &path).unwrap();

        let loaded = load_image(&path).unwrap();
        assert_eq!((loaded.width, loaded.height), (130, 70));
        assert_eq!(loaded.resolution, 300.0);
        assert_eq!(loaded.active_layer_index, 2);
        let names: Vec<_> = loaded.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["Background", "W 130\u{200A}px", "label"]);
        let ids: Vec<_> = loaded.layers.iter().map(|l| l.id).collect();
        let orig: Vec<_> = canvas.layers.iter().map(|l| l.id).collect();
        assert_eq!(ids, orig);
        assert_eq!(loaded.layers[1].opacity, canvas.layers[1].opacity);
        assert_eq!(*loaded.layers[1].pixels.get_pixel(129, 69), Rgba([0, 0, 0, 255]));
        assert_eq!(loaded.layers[2].text, canvas.layers[2].text);
    }

    #[test]
    fn rejects_unknown_magic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.smk");
        std::fs::write(&path, b"\x04\0\0\0\0\0\0\0NOPEsomething").unwrap();
        assert!(matches!(load_project(&path), Err(ProjectError::InvalidFormat(_))));

        std::fs::write(&path, b"tiny").unwrap();
        assert!(matches!(load_project(&path), Err(ProjectError::InvalidFormat(_))));
    }

    #[test]
    fn implausible_stored_resolution_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dense.smk");
        let mut canvas = CanvasState::new(8, 8);
        canvas.resolution = 1_000_000.0;
        save_project(&canvas, &path).unwrap();

        assert_eq!(load_project(&path).unwrap().resolution, DEFAULT_RESOLUTION);
    }

    #[test]
    fn rejects_oversized_canvas() {
        let project = ProjectFile {
            magic: SMK_MAGIC.into(),
            width: MAX_CANVAS_DIM + 1,
            height: 10,
            resolution: 72.0,
            active_layer_index: 0,
            layers: Vec::new(),
        };
        assert!(matches!(project_into_canvas(project), Err(ProjectError::InvalidFormat(_))));
    }

    #[rstest]
    #[case(SaveFormat::Png, TiffCompression::None)]
    #[case(SaveFormat::Bmp, TiffCompression::None)]
    #[case(SaveFormat::Tiff, TiffCompression::Lzw)]
    #[case(SaveFormat::Tiff, TiffCompression::Deflate)]
    fn flattened_output_decodes_back(#[case] format: SaveFormat, #[case] compression: TiffCompression) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("out.{}", format.extension()));
        let canvas = sample_canvas();
        save_canvas(&canvas, &path, format, 90, compression).unwrap();

        let back = load_image(&path).unwrap();
        assert_eq!((back.width, back.height), (130, 70));
        assert_eq!(back.layers.len(), 1);
        let px = back.layers[0].pixels.get_pixel(129, 69);
        assert!(px[0] < 128, "mark pixel should be dark, got {:?}", px);
    }

    #[test]
    fn formats_parse_from_names() {
        assert_eq!("JPEG".parse::<SaveFormat>(), Ok(SaveFormat::Jpeg));
        assert_eq!("tif".parse::<SaveFormat>(), Ok(SaveFormat::Tiff));
        assert!("gif".parse::<SaveFormat>().is_err());
        assert_eq!("zip".parse::<TiffCompression>(), Ok(TiffCompression::Deflate));
    }
}
