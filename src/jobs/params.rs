//! # Parámetros de Generación
//! src/jobs/params.rs
//!
//! Estructura tipada con los parámetros de un job, validada una sola vez
//! en la admisión. Los campos llegan como query params de
//! `POST /process-image` y la imagen como body crudo.

use crate::error::{JobError, Result};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::str::FromStr;

pub const DEFAULT_WIDTH: u32 = 1024;
pub const DEFAULT_HEIGHT: u32 = 1024;
pub const DEFAULT_STEPS: u32 = 28;
pub const DEFAULT_GUIDANCE_SCALE: f32 = 2.5;
pub const DEFAULT_TRUE_CFG_SCALE: f32 = 1.5;

/// Parámetro avanzado fijo
pub const MAX_SEQUENCE_LENGTH: u32 = 512;

/// Extensiones aceptadas para la imagen de entrada
pub const ALLOWED_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "webp"];

/// Formatos de imagen aceptados
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// Detecta el formato por los magic bytes
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }
}

/// Imagen subida por el cliente
#[derive(Debug, Clone, PartialEq)]
pub struct InputImage {
    pub format: ImageFormat,
    pub bytes: Vec<u8>,
}

impl InputImage {
    /// Valida la imagen subida.
    ///
    /// `filename` es opcional; si viene, su extensión debe estar permitida.
    pub fn from_upload(bytes: Vec<u8>, filename: Option<&str>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(JobError::Validation(
                "No image data in the request body.".to_string(),
            ));
        }

        if let Some(name) = filename {
            let allowed = name
                .rsplit_once('.')
                .and_then(|(_, ext)| ImageFormat::from_extension(ext))
                .is_some();
            if !allowed {
                return Err(JobError::Validation(format!(
                    "Invalid or no image file provided. Allowed types: {}",
                    ALLOWED_EXTENSIONS.join(", ")
                )));
            }
        }

        let format = ImageFormat::detect(&bytes).ok_or_else(|| {
            JobError::Validation("The uploaded file is not a valid image.".to_string())
        })?;

        Ok(Self { format, bytes })
    }
}

/// Parámetros completos de un job de generación
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub image: InputImage,
    pub prompt: String,
    pub prompt_2: Option<String>,
    pub negative_prompt: Option<String>,
    pub negative_prompt_2: Option<String>,
    pub width: u32,
    pub height: u32,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub true_cfg_scale: f32,
    pub max_sequence_length: u32,
    pub num_images_per_prompt: u32,

    /// Semilla efectiva (la del cliente o una aleatoria)
    pub seed: u64,
}

impl GenerationParams {
    /// Construye los parámetros a partir de los campos del request
    pub fn from_fields(fields: &HashMap<String, String>, image: InputImage) -> Result<Self> {
        let width = parse_field(fields, "width", DEFAULT_WIDTH)?;
        let height = parse_field(fields, "height", DEFAULT_HEIGHT)?;
        let num_inference_steps = parse_field(fields, "num_inference_steps", DEFAULT_STEPS)?;

        if width == 0 || height == 0 || num_inference_steps == 0 {
            return Err(JobError::Validation(
                "width, height and num_inference_steps must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            image,
            prompt: fields.get("prompt").cloned().unwrap_or_default(),
            prompt_2: optional_text(fields, "prompt_2"),
            negative_prompt: optional_text(fields, "negative_prompt"),
            negative_prompt_2: optional_text(fields, "negative_prompt_2"),
            width,
            height,
            num_inference_steps,
            guidance_scale: parse_field(fields, "guidance_scale", DEFAULT_GUIDANCE_SCALE)?,
            true_cfg_scale: parse_field(fields, "true_cfg_scale", DEFAULT_TRUE_CFG_SCALE)?,
            max_sequence_length: MAX_SEQUENCE_LENGTH,
            num_images_per_prompt: 1,
            seed: resolve_seed(fields.get("seed").map(String::as_str)),
        })
    }

    /// Todos los parámetros excepto los bytes de la imagen.
    ///
    /// Se usa para logs y para pasarle los parámetros al generador.
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "image_format": self.image.format,
            "image_bytes": self.image.bytes.len(),
            "prompt": self.prompt,
            "prompt_2": self.prompt_2,
            "negative_prompt": self.negative_prompt,
            "negative_prompt_2": self.negative_prompt_2,
            "width": self.width,
            "height": self.height,
            "num_inference_steps": self.num_inference_steps,
            "guidance_scale": self.guidance_scale,
            "true_cfg_scale": self.true_cfg_scale,
            "max_sequence_length": self.max_sequence_length,
            "num_images_per_prompt": self.num_images_per_prompt,
            "seed": self.seed,
        })
    }
}

fn parse_field<T>(fields: &HashMap<String, String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match fields.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e| {
            JobError::Validation(format!(
                "Invalid parameter type provided. Please ensure all numerical fields are numbers. Details: {}: {}",
                key, e
            ))
        }),
    }
}

/// Prompts opcionales: un valor vacío equivale a no enviarlo
fn optional_text(fields: &HashMap<String, String>, key: &str) -> Option<String> {
    fields.get(key).filter(|v| !v.is_empty()).cloned()
}

fn resolve_seed(raw: Option<&str>) -> u64 {
    raw.filter(|s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| rand::thread_rng().gen_range(0..u64::from(u32::MAX)))
}
