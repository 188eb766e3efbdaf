use crate::api::models::{RenderRequest, ValidRenderRequest};
use crate::render::RenderOptions;

pub const MIN_TEXT_CHARS: usize = 10;
pub const MAX_TEXT_CHARS: usize = 1000;

pub fn validate_render_request(body: RenderRequest) -> Result<ValidRenderRequest, String> {
    let text = body.text.ok_or("field 'text' is required")?;
    let chars = text.trim().chars().count();
    if chars == 0 {
        return Err("field 'text' is required".into());
    }
    if chars < MIN_TEXT_CHARS {
        return Err(format!(
            "field 'text' must have at least {MIN_TEXT_CHARS} characters"
        ));
    }
    if chars > MAX_TEXT_CHARS {
        return Err(format!(
            "field 'text' cannot exceed {MAX_TEXT_CHARS} characters"
        ));
    }

    let opts = body.options.unwrap_or_default();
    let options = RenderOptions {
        quality: in_range("options.quality", opts.quality, 0, 100)?,
        fps: in_range("options.fps", opts.fps, 1, 60)?,
        width: in_range("options.width", opts.width, 100, 7680)?,
        height: in_range("options.height", opts.height, 100, 4320)?,
    };

    Ok(ValidRenderRequest {
        text,
        output_format: opts.output_format.unwrap_or_default(),
        options,
    })
}

fn in_range(name: &str, value: Option<i64>, min: i64, max: i64) -> Result<Option<u32>, String> {
    match value {
        None => Ok(None),
        Some(v) if (min..=max).contains(&v) => u32::try_from(v)
            .map(Some)
            .map_err(|_| format!("{name} must be a number between {min} and {max}")),
        Some(_) => Err(format!("{name} must be a number between {min} and {max}")),
    }
}
