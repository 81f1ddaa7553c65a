use std::collections::{HashMap, HashSet};
use std::ops::RangeInclusive;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use anyhow::Result;
use eframe::egui;

use crate::decoder::{DecodedImage, ImageDecoder};

pub const DEFAULT_PRELOAD_RADIUS: usize = 5;

struct Completion {
    index: usize,
    result: Result<Arc<DecodedImage>>,
}

pub struct FramePrefetcher {
    image_ids: Arc<[String]>,
    decoder: Arc<dyn ImageDecoder>,
    radius: usize,
    cache_limit: Option<usize>,
    cache: HashMap<usize, Arc<DecodedImage>>,
    in_flight: HashSet<usize>,
    completion_tx: Sender<Completion>,
    completion_rx: Receiver<Completion>,
    repaint: Option<egui::Context>,
}

impl FramePrefetcher {
    pub fn new(image_ids: Arc<[String]>, decoder: Arc<dyn ImageDecoder>, radius: usize) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel();
        Self {
            image_ids,
            decoder,
            radius,
            cache_limit: None,
            cache: HashMap::new(),
            in_flight: HashSet::new(),
            completion_tx,
            completion_rx,
            repaint: None,
        }
    }

    pub fn with_cache_limit(mut self, limit: Option<usize>) -> Self {
        let window = self.radius.saturating_mul(2).saturating_add(1);
        self.cache_limit = limit.map(|limit| limit.max(window));
        self
    }

    pub fn with_repaint(mut self, ctx: egui::Context) -> Self {
        self.repaint = Some(ctx);
        self
    }

    pub fn total_frames(&self) -> usize {
        self.image_ids.len()
    }

    pub fn cached(&self, index: usize) -> Option<Arc<DecodedImage>> {
        self.cache.get(&index).cloned()
    }

    pub fn is_cached(&self, index: usize) -> bool {
        self.cache.contains_key(&index)
    }

    pub fn is_loading(&self, index: usize) -> bool {
        self.in_flight.contains(&index)
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    pub fn pending_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Starts decoding `index` unless it is cached or already being decoded.
    /// Returns whether a decode was issued.
    pub fn load_image(&mut self, index: usize) -> bool {
        let Some(image_id) = self.image_ids.get(index).cloned() else {
            return false;
        };
        if self.cache.contains_key(&index) || !self.in_flight.insert(index) {
            return false;
        }

        let decoder = Arc::clone(&self.decoder);
        let tx = self.completion_tx.clone();
        let repaint = self.repaint.clone();
        thread::spawn(move || {
            let result = decoder.decode(&image_id);
            // The receiver is gone once the player closes; nothing to report then.
            let _ = tx.send(Completion { index, result });
            if let Some(ctx) = repaint {
                ctx.request_repaint();
            }
        });
        true
    }

    pub fn preload_around(&mut self, center: usize) -> Vec<usize> {
        let Some(window) = preload_window(center, self.radius, self.total_frames()) else {
            return Vec::new();
        };
        let issued = window.filter(|&index| self.load_image(index)).collect();
        self.evict_far_from(center);
        issued
    }

    pub fn poll(&mut self) -> Vec<usize> {
        let mut loaded = Vec::new();
        loop {
            match self.completion_rx.try_recv() {
                Ok(completion) => loaded.extend(self.apply(completion)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        loaded
    }

    fn apply(&mut self, completion: Completion) -> Option<usize> {
        let Completion { index, result } = completion;
        self.in_flight.remove(&index);
        match result {
            Ok(image) => {
                self.cache.insert(index, image);
                Some(index)
            }
            Err(err) => {
                let image_id = self.image_ids.get(index).map(String::as_str).unwrap_or("?");
                log::warn!("Failed to load image {image_id} (frame {}): {err:#}", index + 1);
                None
            }
        }
    }

    fn evict_far_from(&mut self, center: usize) {
        let Some(limit) = self.cache_limit else {
            return;
        };
        if self.cache.len() <= limit {
            return;
        }
        let mut by_distance: Vec<usize> = self.cache.keys().copied().collect();
        by_distance.sort_by_key(|&index| std::cmp::Reverse(index.abs_diff(center)));
        let excess = self.cache.len() - limit;
        for index in by_distance.into_iter().take(excess) {
            if index.abs_diff(center) > self.radius {
                self.cache.remove(&index);
            }
        }
    }
}

pub fn preload_window(center: usize, radius: usize, total: usize) -> Option<RangeInclusive<usize>> {
    if total == 0 {
        return None;
    }
    let center = center.min(total - 1);
    let first = center.saturating_sub(radius);
    let last = center.saturating_add(radius).min(total - 1);
    Some(first..=last)
}
