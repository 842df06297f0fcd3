use image::{DynamicImage, GrayImage, Luma};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::ocr::Region;
use crate::ocr::engine::{
    EngineFailure, EngineFuture, LayoutMode, RecognitionEngine, RecognitionOptions,
};
use crate::providers::{Message, Provider, ProviderFuture, ProviderResponse, ProviderUsage};

pub(crate) fn white_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([255])))
}

/// White canvas with solid black rectangles.
pub(crate) fn bar_image(width: u32, height: u32, bars: &[Region]) -> DynamicImage {
    let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
    for bar in bars {
        for y in bar.y..bar.bottom().min(height) {
            for x in bar.x..bar.right().min(width) {
                canvas.put_pixel(x, y, Luma([0]));
            }
        }
    }
    DynamicImage::ImageLuma8(canvas)
}

pub(crate) fn png_bytes(image: &DynamicImage) -> Vec<u8> {
    let mut bytes = std::io::Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, image::ImageFormat::Png)
        .expect("encode png");
    bytes.into_inner()
}

/// Call log entry: image path, options, and whether the file existed.
pub(crate) type EngineCall = (PathBuf, RecognitionOptions, bool);

#[derive(Default)]
struct Script {
    queued: VecDeque<Result<String, EngineFailure>>,
    by_layout: HashMap<LayoutMode, String>,
    fallback: String,
    calls: Vec<EngineCall>,
}

/// In-memory engine: queued responses first, then per-layout text, then a
/// fallback string.
#[derive(Clone, Default)]
pub(crate) struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
}

impl ScriptedEngine {
    pub(crate) fn new(responses: Vec<Result<String, EngineFailure>>) -> Self {
        let engine = Self::default();
        engine.script.lock().expect("script").queued = responses.into();
        engine
    }

    pub(crate) fn always(text: &str) -> Self {
        let engine = Self::default();
        engine.script.lock().expect("script").fallback = text.to_string();
        engine
    }

    pub(crate) fn by_layout(entries: &[(LayoutMode, &str)]) -> Self {
        let engine = Self::default();
        engine.script.lock().expect("script").by_layout = entries
            .iter()
            .map(|(layout, text)| (*layout, text.to_string()))
            .collect();
        engine
    }

    pub(crate) fn calls(&self) -> Vec<EngineCall> {
        self.script.lock().expect("script").calls.clone()
    }
}

impl RecognitionEngine for ScriptedEngine {
    fn run(&self, image: PathBuf, options: RecognitionOptions) -> EngineFuture {
        let mut script = self.script.lock().expect("script");
        let existed = image.exists();
        let response = match script.queued.pop_front() {
            Some(response) => response,
            None => Ok(script
                .by_layout
                .get(&options.layout)
                .cloned()
                .unwrap_or_else(|| script.fallback.clone())),
        };
        script.calls.push((image, options, existed));
        Box::pin(async move { response })
    }
}

/// Provider returning a canned answer and recording every prompt it sends.
#[derive(Clone)]
pub(crate) struct CannedProvider {
    answer: Result<String, String>,
    messages: Vec<Message>,
    sent: Arc<Mutex<Vec<Vec<Message>>>>,
}

impl CannedProvider {
    pub(crate) fn answering(answer: &str) -> Self {
        Self {
            answer: Ok(answer.to_string()),
            messages: Vec::new(),
            sent: Arc::default(),
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self {
            answer: Err(message.to_string()),
            messages: Vec::new(),
            sent: Arc::default(),
        }
    }

    pub(crate) fn sent(&self) -> Vec<Vec<Message>> {
        self.sent.lock().expect("sent").clone()
    }
}

impl Provider for CannedProvider {
    fn append_system_input(mut self, input: String) -> Self {
        self.messages.push(Message::system(input));
        self
    }

    fn append_user_input(mut self, input: String) -> Self {
        self.messages.push(Message::user(input));
        self
    }

    fn complete(self) -> ProviderFuture {
        self.sent.lock().expect("sent").push(self.messages.clone());
        let answer = self.answer.clone();
        Box::pin(async move {
            let text = answer.map_err(|message| anyhow::anyhow!(message))?;
            let completion_tokens = text.chars().count() as u64;
            Ok(ProviderResponse {
                text,
                model: Some("canned".to_string()),
                usage: Some(ProviderUsage {
                    prompt_tokens: Some(10),
                    completion_tokens: Some(completion_tokens),
                    total_tokens: Some(10 + completion_tokens),
                }),
            })
        })
    }
}
