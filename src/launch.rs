use std::path::PathBuf;

use crate::playback::FrameRate;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LaunchRequest {
    pub paths: Vec<PathBuf>,
    pub frame_rate: Option<FrameRate>,
}

pub fn parse_launch_request_from_args(args: &[String]) -> Result<Option<LaunchRequest>, String> {
    let mut request = LaunchRequest::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--fps" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "Missing value after --fps.".to_string())?;
                request.frame_rate = Some(parse_frame_rate(value)?);
            }
            "--open" => {}
            other if other.starts_with("--fps=") => {
                request.frame_rate = Some(parse_frame_rate(&other["--fps=".len()..])?);
            }
            other if other.starts_with("--") => {
                return Err(format!("Unknown option {other}."));
            }
            path => request.paths.push(PathBuf::from(path)),
        }
    }

    if request.paths.is_empty() {
        if request.frame_rate.is_some() || args.iter().any(|arg| arg == "--open") {
            return Err("Missing file path(s) to open.".to_string());
        }
        return Ok(None);
    }
    Ok(Some(request))
}

fn parse_frame_rate(value: &str) -> Result<FrameRate, String> {
    value
        .trim()
        .parse::<u8>()
        .ok()
        .and_then(FrameRate::new)
        .ok_or_else(|| {
            format!(
                "Invalid --fps value {value:?} (expected {}-{}).",
                FrameRate::MIN,
                FrameRate::MAX
            )
        })
}
