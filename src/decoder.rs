use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use dicom_object::{open_file, DefaultDicomObject};
use dicom_pixeldata::PixelDecoder;

pub const IMAGE_ID_SCHEME: &str = "dicomfile:";
const FRAME_QUERY: &str = "?frame=";
const OPEN_INSTANCE_LIMIT: usize = 4;

/// Decodes one image id into pixels. Implementations are called from worker
/// threads, so they must be shareable.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, image_id: &str) -> Result<Arc<DecodedImage>>;
}

#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pixels: Option<Arc<[i32]>>,
    pub window_center: Option<f32>,
    pub window_width: Option<f32>,
}

impl DecodedImage {
    pub fn new(width: usize, height: usize, pixels: Vec<i32>) -> Self {
        Self {
            width,
            height,
            pixels: Some(Arc::<[i32]>::from(pixels.into_boxed_slice())),
            window_center: None,
            window_width: None,
        }
    }

    #[cfg(test)]
    pub fn without_pixels(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: None,
            window_center: None,
            window_width: None,
        }
    }

    pub fn with_window(mut self, center: Option<f32>, width: Option<f32>) -> Self {
        self.window_center = center;
        self.window_width = width;
        self
    }

    pub fn pixel_data(&self) -> Option<&[i32]> {
        self.pixels.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageLocator {
    pub path: PathBuf,
    pub frame: u32,
}

pub fn image_id(path: &Path, frame: Option<u32>) -> String {
    match frame {
        Some(frame) => format!("{IMAGE_ID_SCHEME}{}{FRAME_QUERY}{frame}", path.display()),
        None => format!("{IMAGE_ID_SCHEME}{}", path.display()),
    }
}

pub fn parse_image_id(image_id: &str) -> Result<ImageLocator> {
    let rest = image_id.strip_prefix(IMAGE_ID_SCHEME).unwrap_or(image_id);
    let (path, frame) = match rest.rsplit_once(FRAME_QUERY) {
        Some((path, frame)) => {
            let frame = frame
                .trim()
                .parse::<u32>()
                .with_context(|| format!("Invalid frame number in image id {image_id}"))?;
            (path, frame)
        }
        None => (rest, 0),
    };

    if path.trim().is_empty() {
        bail!("Image id {image_id:?} does not name a file");
    }

    Ok(ImageLocator {
        path: PathBuf::from(path),
        frame,
    })
}

pub struct DicomFileDecoder {
    instances: OpenInstances<DefaultDicomObject>,
}

impl DicomFileDecoder {
    pub fn new() -> Self {
        Self {
            instances: OpenInstances::new(OPEN_INSTANCE_LIMIT),
        }
    }
}

impl Default for DicomFileDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageDecoder for DicomFileDecoder {
    fn decode(&self, image_id: &str) -> Result<Arc<DecodedImage>> {
        let locator = parse_image_id(image_id)?;
        let obj = self.instances.get_or_open(&locator.path, |path| {
            open_file(path).with_context(|| format!("Could not open {}", path.display()))
        })?;
        decode_frame(&obj, locator.frame).map(Arc::new)
    }
}

type InstanceSlot<T> = Arc<Mutex<Option<Arc<T>>>>;

// Frames of one multi-frame instance share a single parsed file. Concurrent
// requests for the same path wait on its slot; other paths open in parallel.
struct OpenInstances<T> {
    capacity: usize,
    slots: Mutex<VecDeque<(PathBuf, InstanceSlot<T>)>>,
}

impl<T> OpenInstances<T> {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            slots: Mutex::new(VecDeque::new()),
        }
    }

    fn get_or_open(
        &self,
        path: &Path,
        open: impl FnOnce(&Path) -> Result<T>,
    ) -> Result<Arc<T>> {
        let slot = {
            let mut slots = self
                .slots
                .lock()
                .map_err(|err| anyhow!("Open instance cache lock poisoned: {err}"))?;
            let slot = slots
                .iter()
                .position(|(cached, _)| cached == path)
                .and_then(|pos| slots.remove(pos))
                .map(|(_, slot)| slot)
                .unwrap_or_else(|| Arc::new(Mutex::new(None)));
            slots.push_back((path.to_path_buf(), Arc::clone(&slot)));
            while slots.len() > self.capacity {
                slots.pop_front();
            }
            slot
        };

        let mut opened = slot
            .lock()
            .map_err(|err| anyhow!("Open instance lock poisoned for {}: {err}", path.display()))?;
        if let Some(instance) = opened.as_ref() {
            return Ok(Arc::clone(instance));
        }
        let instance = Arc::new(open(path)?);
        *opened = Some(Arc::clone(&instance));
        Ok(instance)
    }
}

fn decode_frame(obj: &DefaultDicomObject, frame: u32) -> Result<DecodedImage> {
    let decoded = obj
        .decode_pixel_data_frame(frame)
        .with_context(|| format!("Failed to decode PixelData frame {frame}"))?;

    if decoded.samples_per_pixel() != 1 {
        bail!(
            "SamplesPerPixel={} is not supported (only monochrome)",
            decoded.samples_per_pixel()
        );
    }
    let bits_allocated = decoded.bits_allocated();
    if bits_allocated != 8 && bits_allocated != 16 {
        bail!("BitsAllocated={} is not supported (only 8/16)", bits_allocated);
    }

    let width = decoded.columns() as usize;
    let height = decoded.rows() as usize;
    let pixels: Vec<i32> = decoded
        .to_vec_frame(0)
        .with_context(|| format!("Could not convert decoded frame {frame} to i32 samples"))?;

    Ok(DecodedImage::new(width, height, pixels).with_window(
        read_float_first(obj, "WindowCenter"),
        read_float_first(obj, "WindowWidth"),
    ))
}

pub(crate) fn read_string(obj: &DefaultDicomObject, name: &str) -> Option<String> {
    obj.element_by_name(name)
        .ok()
        .and_then(|el| el.to_str().ok())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn read_int_first(obj: &DefaultDicomObject, name: &str) -> Option<i32> {
    read_string(obj, name).and_then(|value| {
        value
            .split('\\')
            .next()
            .and_then(|v| v.trim().parse::<i32>().ok())
    })
}

fn read_float_first(obj: &DefaultDicomObject, name: &str) -> Option<f32> {
    read_string(obj, name).and_then(|value| parse_multi_valued_number(&value))
}

fn parse_multi_valued_number(value: &str) -> Option<f32> {
    value.split('\\').next()?.trim().parse::<f32>().ok()
}

pub struct CachingDecoder<D> {
    inner: D,
    capacity: usize,
    cache: Mutex<DecodeCache>,
}

#[derive(Default)]
struct DecodeCache {
    images: HashMap<String, Arc<DecodedImage>>,
    order: VecDeque<String>,
}

impl<D: ImageDecoder> CachingDecoder<D> {
    pub fn new(inner: D, capacity: usize) -> Self {
        Self {
            inner,
            capacity: capacity.max(1),
            cache: Mutex::new(DecodeCache::default()),
        }
    }

    #[cfg(test)]
    fn cached_len(&self) -> usize {
        self.cache.lock().map(|cache| cache.images.len()).unwrap_or(0)
    }

    fn lookup(&self, image_id: &str) -> Result<Option<Arc<DecodedImage>>> {
        let cache = self
            .cache
            .lock()
            .map_err(|err| anyhow!("Decoder cache lock poisoned: {err}"))?;
        Ok(cache.images.get(image_id).cloned())
    }

    fn store(&self, image_id: &str, image: &Arc<DecodedImage>) -> Result<()> {
        let mut cache = self
            .cache
            .lock()
            .map_err(|err| anyhow!("Decoder cache lock poisoned: {err}"))?;
        if cache
            .images
            .insert(image_id.to_string(), Arc::clone(image))
            .is_none()
        {
            cache.order.push_back(image_id.to_string());
        }
        while cache.order.len() > self.capacity {
            if let Some(oldest) = cache.order.pop_front() {
                cache.images.remove(&oldest);
            }
        }
        Ok(())
    }
}

impl<D: ImageDecoder> ImageDecoder for CachingDecoder<D> {
    fn decode(&self, image_id: &str) -> Result<Arc<DecodedImage>> {
        if let Some(hit) = self.lookup(image_id)? {
            return Ok(hit);
        }
        let image = self.inner.decode(image_id)?;
        self.store(image_id, &image)?;
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDecoder {
        calls: AtomicUsize,
    }

    impl ImageDecoder for CountingDecoder {
        fn decode(&self, image_id: &str) -> Result<Arc<DecodedImage>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if image_id.contains("broken") {
                bail!("cannot decode {image_id}");
            }
            Ok(Arc::new(DecodedImage::new(1, 1, vec![0])))
        }
    }

    fn counting() -> CountingDecoder {
        CountingDecoder {
            calls: AtomicUsize::new(0),
        }
    }

    #[test]
    fn image_id_roundtrips_path_and_frame() {
        let path = Path::new("/data/ct/IM0001.dcm");
        let id = image_id(path, Some(7));
        assert_eq!(id, "dicomfile:/data/ct/IM0001.dcm?frame=7");

        let locator = parse_image_id(&id).expect("id should parse");
        assert_eq!(locator.path, PathBuf::from("/data/ct/IM0001.dcm"));
        assert_eq!(locator.frame, 7);
    }

    #[test]
    fn bare_path_is_frame_zero() {
        let locator = parse_image_id("scans/a.dcm").expect("bare path should parse");
        assert_eq!(locator.path, PathBuf::from("scans/a.dcm"));
        assert_eq!(locator.frame, 0);
    }

    #[test]
    fn malformed_ids_are_rejected() {
        assert!(parse_image_id("dicomfile:").is_err());
        assert!(parse_image_id("dicomfile:a.dcm?frame=x").is_err());
    }

    #[test]
    fn missing_file_fails_to_decode() {
        let result = DicomFileDecoder::new().decode("dicomfile:/nonexistent/stackcine/none.dcm");
        assert!(result.is_err());
    }

    #[test]
    fn multi_valued_window_uses_first_value() {
        assert_eq!(parse_multi_valued_number("40\\400"), Some(40.0));
        assert_eq!(parse_multi_valued_number(" -600 "), Some(-600.0));
        assert_eq!(parse_multi_valued_number("abc"), None);
    }

    #[test]
    fn frames_of_one_instance_share_a_single_open() {
        let instances = OpenInstances::new(4);
        let opens = AtomicUsize::new(0);
        let open = |path: &Path| -> Result<String> {
            opens.fetch_add(1, Ordering::SeqCst);
            Ok(path.display().to_string())
        };

        let path = Path::new("/data/ct/multiframe.dcm");
        let first = instances.get_or_open(path, open).expect("first open");
        let second = instances.get_or_open(path, open).expect("second open");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(opens.load(Ordering::SeqCst), 1);

        instances
            .get_or_open(Path::new("/data/ct/other.dcm"), open)
            .expect("other open");
        assert_eq!(opens.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_requests_for_one_path_open_it_once() {
        let instances = Arc::new(OpenInstances::<u32>::new(4));
        let opens = Arc::new(AtomicUsize::new(0));
        let workers: Vec<_> = (0..11)
            .map(|_| {
                let instances = Arc::clone(&instances);
                let opens = Arc::clone(&opens);
                std::thread::spawn(move || {
                    instances
                        .get_or_open(Path::new("/data/ct/multiframe.dcm"), |_| {
                            opens.fetch_add(1, Ordering::SeqCst);
                            std::thread::sleep(std::time::Duration::from_millis(5));
                            Ok(0_u32)
                        })
                        .expect("open")
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker should finish");
        }
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn least_recently_used_instance_is_dropped_first() {
        let instances = OpenInstances::new(2);
        let opens = AtomicUsize::new(0);
        let open = |_: &Path| -> Result<()> {
            opens.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };

        for name in ["a.dcm", "b.dcm", "a.dcm", "c.dcm"] {
            instances.get_or_open(Path::new(name), open).expect("open");
        }
        assert_eq!(opens.load(Ordering::SeqCst), 3);

        instances.get_or_open(Path::new("a.dcm"), open).expect("a kept");
        assert_eq!(opens.load(Ordering::SeqCst), 3);
        instances.get_or_open(Path::new("b.dcm"), open).expect("b reopened");
        assert_eq!(opens.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn failed_open_is_retried_on_the_next_request() {
        let instances = OpenInstances::<u8>::new(2);
        let path = Path::new("broken.dcm");
        assert!(instances.get_or_open(path, |_| bail!("truncated file")).is_err());
        assert_eq!(instances.get_or_open(path, |_| Ok(7)).expect("reopen"), Arc::new(7));
    }

    #[test]
    fn caching_decoder_decodes_each_id_once() {
        let decoder = CachingDecoder::new(counting(), 8);
        let first = decoder.decode("a").expect("decode a");
        let second = decoder.decode("a").expect("decode a again");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(decoder.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn caching_decoder_evicts_oldest_when_full() {
        let decoder = CachingDecoder::new(counting(), 2);
        for id in ["a", "b", "c"] {
            decoder.decode(id).expect("decode");
        }
        assert_eq!(decoder.cached_len(), 2);

        decoder.decode("a").expect("decode a after eviction");
        assert_eq!(decoder.inner.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn caching_decoder_does_not_remember_failures() {
        let decoder = CachingDecoder::new(counting(), 2);
        assert!(decoder.decode("broken").is_err());
        assert!(decoder.decode("broken").is_err());
        assert_eq!(decoder.cached_len(), 0);
        assert_eq!(decoder.inner.calls.load(Ordering::SeqCst), 2);
    }
}
