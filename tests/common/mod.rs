#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use docent::embedding::EmbeddingProvider;
use docent::error::{ProviderError, RagError};
use docent::llm::{ChatMessage, ChatProvider};
use docent::models::Chunk;

pub const DIMS: usize = 1024;

/// Bag-of-words embedder: each lowercase word is hashed into one of
/// `DIMS` buckets. Texts sharing words get similar vectors.
pub struct HashEmbedder {
    pub calls: AtomicUsize,
    model: &'static str,
    fail_with: Option<fn() -> ProviderError>,
    configured: bool,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            model: "hash-1024",
            fail_with: None,
            configured: true,
        }
    }

    pub fn failing(err: fn() -> ProviderError) -> Self {
        Self {
            fail_with: Some(err),
            ..Self::new()
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::new()
        }
    }

    /// Same vectors, reported under another model name.
    pub fn named(model: &'static str) -> Self {
        Self {
            model,
            ..Self::new()
        }
    }
}

pub fn embed_text(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h: u64 = 1469598103934665603;
        for b in word.to_lowercase().bytes() {
            h ^= b as u64;
            h = h.wrapping_mul(1099511628211);
        }
        v[(h % DIMS as u64) as usize] += 1.0;
    }
    v
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn model_name(&self) -> &str {
        self.model
    }

    fn ensure_configured(&self) -> Result<(), RagError> {
        if self.configured {
            Ok(())
        } else {
            Err(RagError::configuration("test embedder has no credential"))
        }
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.fail_with {
            return Err(err());
        }
        Ok(texts.iter().map(|t| embed_text(t)).collect())
    }
}

pub enum ChatBehavior {
    /// Reply with a fixed answer.
    Reply(&'static str),
    Fail(fn() -> ProviderError),
}

pub struct FakeChat {
    behavior: ChatBehavior,
    configured: bool,
    pub seen: Mutex<Vec<Vec<ChatMessage>>>,
}

impl FakeChat {
    pub fn replying(answer: &'static str) -> Self {
        Self {
            behavior: ChatBehavior::Reply(answer),
            configured: true,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(err: fn() -> ProviderError) -> Self {
        Self {
            behavior: ChatBehavior::Fail(err),
            configured: true,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured() -> Self {
        Self {
            configured: false,
            ..Self::replying("unused")
        }
    }
}

#[async_trait]
impl ChatProvider for FakeChat {
    fn name(&self) -> &str {
        "fake"
    }

    fn ensure_configured(&self) -> Result<(), RagError> {
        if self.configured {
            Ok(())
        } else {
            Err(RagError::configuration("test chat has no credential"))
        }
    }

    async fn complete(
        &self,
        messages: &[ChatMessage],
        _model: &str,
        _temperature: f32,
    ) -> Result<String, ProviderError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        match &self.behavior {
            ChatBehavior::Reply(answer) => Ok(answer.to_string()),
            ChatBehavior::Fail(err) => Err(err()),
        }
    }
}

pub fn chunk(id: &str, text: &str, file: &str, page: u32) -> Chunk {
    Chunk::with_metadata(
        id.to_string(),
        text.to_string(),
        PathBuf::from(format!("/docs/{}", file)),
        Some(page),
        format!("hash-{}", id),
    )
}

pub fn sample_chunks() -> Vec<Chunk> {
    vec![
        chunk("c1", "The warranty covers parts and labour for two years", "manual.pdf", 0),
        chunk("c2", "To reset the router hold the button for ten seconds", "manual.pdf", 3),
        chunk("c3", "Battery life is about twelve hours of video playback", "specs.pdf", 1),
        chunk("c4", "Shipping is free for orders above fifty euros", "faq.pdf", 0),
    ]
}

pub fn shared<T: 'static>(value: T) -> Arc<T> {
    Arc::new(value)
}

/// Two-page PDF whose pages read `page one phrase` and `page two phrase`.
pub fn two_page_pdf() -> Vec<u8> {
    let page_stream = |text: &str| {
        let body = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", text);
        format!(
            "<< /Length {} >> stream\n{}\nendstream",
            body.len(),
            body
        )
    };
    let objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R 5 0 R] /Count 2 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 7 0 R >> >> >>".to_string(),
        page_stream("page one phrase"),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 6 0 R /Resources << /Font << /F1 7 0 R >> >> >>".to_string(),
        page_stream("page two phrase"),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string(),
    ];

    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj {} endobj\n", i + 1, body).as_bytes());
    }
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}
