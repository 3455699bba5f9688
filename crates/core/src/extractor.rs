use base64::{engine::general_purpose::STANDARD, Engine};
use lopdf::Document;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::ExtractionError;

/// Turns uploaded PDF bytes into plain text.
pub trait TextExtractor {
    fn extract_text(&self, document_name: &str, bytes: &[u8]) -> Result<String, ExtractionError>;
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest {
    pdf_base64: String,
    document_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    pages: Option<Vec<OcrPage>>,
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrPage {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OcrEndpointConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
}

#[derive(Default)]
pub struct LopdfExtractor;

impl TextExtractor for LopdfExtractor {
    fn extract_text(&self, document_name: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
        let document = Document::load_mem(bytes)
            .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_no, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_no])
                .map_err(|error| ExtractionError::PdfParse(error.to_string()))?;

            if !text.trim().is_empty() {
                pages.push(text);
            }
        }

        if pages.is_empty() {
            return Err(ExtractionError::NoTextLayer(document_name.to_string()));
        }

        Ok(pages.join("\n"))
    }
}

/// Text layer first, OCR fallback when one is configured.
pub fn extract_document_text(
    document_name: &str,
    bytes: &[u8],
) -> Result<String, ExtractionError> {
    let extracted = LopdfExtractor.extract_text(document_name, bytes);

    let fallback_reason = match &extracted {
        Ok(_) => return extracted,
        Err(ExtractionError::PdfParse(reason)) => reason.clone(),
        Err(ExtractionError::NoTextLayer(name)) => format!("no text layer in {name}"),
        Err(_) => return extracted,
    };

    match extract_with_ocr(document_name, bytes) {
        Ok(Some(text)) => Ok(text),
        Ok(None) => extracted,
        Err(ocr_error) => Err(ExtractionError::OcrFailed(format!(
            "{fallback_reason}; {ocr_error}"
        ))),
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentExtractor;

impl TextExtractor for DocumentExtractor {
    fn extract_text(&self, document_name: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
        extract_document_text(document_name, bytes)
    }
}

fn parse_ocr_config() -> Option<OcrEndpointConfig> {
    let endpoint = std::env::var("LLM_OCR_ENDPOINT").ok()?;
    let endpoint = endpoint.trim().to_string();
    if endpoint.is_empty() {
        return None;
    }

    let api_key = std::env::var("LLM_OCR_API_KEY").ok().and_then(|value| {
        let key = value.trim().to_string();
        if key.is_empty() {
            None
        } else {
            Some(key)
        }
    });

    Some(OcrEndpointConfig { endpoint, api_key })
}

fn extract_with_ocr(
    document_name: &str,
    bytes: &[u8],
) -> Result<Option<String>, ExtractionError> {
    let cfg = match parse_ocr_config() {
        Some(cfg) => cfg,
        None => return Ok(None),
    };

    tokio::task::block_in_place(|| ocr_request_blocking(&cfg, document_name, bytes)).map(Some)
}

fn ocr_request_blocking(
    cfg: &OcrEndpointConfig,
    document_name: &str,
    bytes: &[u8],
) -> Result<String, ExtractionError> {
    let payload = OcrRequest {
        pdf_base64: STANDARD.encode(bytes),
        document_name: document_name.to_string(),
    };

    let mut request = Client::new()
        .post(&cfg.endpoint)
        .header("content-type", "application/json")
        .json(&payload);

    if let Some(api_key) = &cfg.api_key {
        request = request.bearer_auth(api_key);
    }

    let response = request.send()?;

    if !response.status().is_success() {
        return Err(ExtractionError::OcrFailed(format!(
            "ocr request to {} returned {}",
            cfg.endpoint,
            response.status()
        )));
    }

    let payload: OcrResponse = response.json()?;

    ocr_payload_text(&payload).ok_or_else(|| {
        ExtractionError::OcrFailed(format!("ocr response was empty for {document_name}"))
    })
}

fn ocr_payload_text(payload: &OcrResponse) -> Option<String> {
    if let Some(listed) = &payload.pages {
        let pages = listed
            .iter()
            .filter_map(|page| {
                let text = page.text.as_ref().map(|value| value.trim().to_string())?;
                if text.is_empty() {
                    None
                } else {
                    Some(text)
                }
            })
            .collect::<Vec<_>>();

        if !pages.is_empty() {
            return Some(pages.join("\n"));
        }
    }

    if let Some(raw_text) = &payload.text {
        let trimmed = raw_text.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.replace('\u{000c}', "\n"));
        }
    }

    None
}
