use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use dicom_object::{DefaultDicomObject, OpenFileOptions, Tag};

use crate::decoder::{image_id, read_int_first, read_string};

const PIXEL_DATA: Tag = Tag(0x7FE0, 0x0010);
const UNKNOWN_SERIES: &str = "Unknown Series";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplaySet {
    pub image_ids: Vec<String>,
    pub series_description: Option<String>,
    pub modality: Option<String>,
    pub series_number: Option<String>,
    pub patient_id: Option<String>,
    pub study_date: Option<String>,
}

struct Instance {
    path: PathBuf,
    instance_number: Option<i32>,
    frame_count: u32,
}

impl DisplaySet {
    #[cfg(test)]
    pub fn from_image_ids(image_ids: Vec<String>) -> Self {
        Self {
            image_ids,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.image_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.image_ids.is_empty()
    }

    pub fn title(&self) -> &str {
        self.series_description
            .as_deref()
            .or(self.modality.as_deref())
            .unwrap_or(UNKNOWN_SERIES)
    }

    pub fn from_paths(paths: &[PathBuf]) -> Result<Self> {
        let files = expand_paths(paths)?;
        let mut first_header = None;
        let mut instances = Vec::with_capacity(files.len());

        for path in files {
            match read_header(&path) {
                Ok(obj) => {
                    instances.push(Instance {
                        instance_number: read_int_first(&obj, "InstanceNumber"),
                        frame_count: read_int_first(&obj, "NumberOfFrames")
                            .filter(|count| *count > 1)
                            .map(|count| count as u32)
                            .unwrap_or(1),
                        path,
                    });
                    if first_header.is_none() {
                        first_header = Some(obj);
                    }
                }
                Err(err) => log::warn!("Skipping {}: {err:#}", path.display()),
            }
        }

        let Some(first) = first_header else {
            bail!("No readable DICOM instances found");
        };

        instances.sort_by_cached_key(|instance| {
            (
                instance.instance_number.unwrap_or(i32::MAX),
                file_name(&instance.path),
            )
        });

        let image_ids = instances
            .iter()
            .flat_map(|instance| {
                let multi_frame = instance.frame_count > 1;
                (0..instance.frame_count).map(move |frame| {
                    image_id(&instance.path, multi_frame.then_some(frame))
                })
            })
            .collect();

        log::info!("Loaded display set with {} instance(s)", instances.len());
        Ok(Self {
            image_ids,
            series_description: read_string(&first, "SeriesDescription"),
            modality: read_string(&first, "Modality"),
            series_number: read_string(&first, "SeriesNumber"),
            patient_id: read_string(&first, "PatientID"),
            study_date: read_string(&first, "StudyDate"),
        })
    }
}

fn read_header(path: &Path) -> Result<DefaultDicomObject> {
    OpenFileOptions::new()
        .read_until(PIXEL_DATA)
        .open_file(path)
        .with_context(|| format!("Could not open {}", path.display()))
}

fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries = fs::read_dir(path)
                .with_context(|| format!("Could not read directory {}", path.display()))?
                .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                .filter(|entry| entry.is_file())
                .collect::<Vec<_>>();
            entries.sort();
            files.extend(entries);
        } else if path.is_file() {
            files.push(path.clone());
        } else {
            bail!("{} does not exist", path.display());
        }
    }
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .and_then(|value| value.to_str())
        .unwrap_or_default()
        .to_string()
}
