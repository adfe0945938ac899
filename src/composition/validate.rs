use crate::composition::types::{Asset, Clip, Edit};
use crate::error::{Result, ValidationError};

/// Check an edit before it can be submitted.
///
/// Fails fast on the first problem, naming the offending field. Tracks without
/// clips are dropped; an edit left with no tracks is rejected.
pub fn validate(mut edit: Edit) -> Result<Edit> {
    if edit.output.format.is_none() {
        return Err(ValidationError::new("output.format", "is required").into());
    }

    if let Some(width) = edit.output.width.filter(|w| *w == 0) {
        return Err(ValidationError::new("output.width", format!("must be positive, got {}", width)).into());
    }
    if let Some(height) = edit.output.height.filter(|h| *h == 0) {
        return Err(ValidationError::new("output.height", format!("must be positive, got {}", height)).into());
    }
    if let Some(fps) = edit.output.fps.filter(|f| !(f.is_finite() && *f > 0.0)) {
        return Err(ValidationError::new("output.fps", format!("must be positive, got {}", fps)).into());
    }

    for (i, track) in edit.timeline.tracks.iter().enumerate() {
        for (j, clip) in track.clips.iter().enumerate() {
            validate_clip(clip, &format!("timeline.tracks[{}].clips[{}]", i, j))?;
        }
    }

    let before = edit.timeline.tracks.len();
    edit.timeline.tracks.retain(|track| !track.clips.is_empty());
    let removed = before - edit.timeline.tracks.len();
    if removed > 0 {
        tracing::warn!("Removed {} empty track(s) from the timeline", removed);
    }

    if edit.timeline.tracks.is_empty() {
        return Err(ValidationError::new(
            "timeline.tracks",
            "must contain at least one track with at least one clip",
        ).into());
    }

    Ok(edit)
}

fn validate_clip(clip: &Clip, path: &str) -> Result<()> {
    let field = |name: &str| format!("{}.{}", path, name);

    if clip.asset.src().trim().is_empty() {
        return Err(ValidationError::new(field("asset.src"), "must not be empty").into());
    }

    if !clip.start.is_finite() || clip.start < 0.0 {
        return Err(ValidationError::new(field("start"), format!("must be >= 0, got {}", clip.start)).into());
    }

    if !clip.length.is_finite() || clip.length <= 0.0 {
        return Err(ValidationError::new(field("length"), format!("must be > 0, got {}", clip.length)).into());
    }

    let (trim, speed, volume) = match &clip.asset {
        Asset::Video { trim, speed, volume, .. } => (*trim, *speed, *volume),
        Asset::Audio { trim, volume, .. } => (*trim, None, *volume),
        Asset::Image { .. } => (None, None, None),
    };

    if let Some(trim) = trim.filter(|t| !t.is_finite() || *t < 0.0) {
        return Err(ValidationError::new(field("asset.trim"), format!("must be >= 0, got {}", trim)).into());
    }
    if let Some(speed) = speed.filter(|s| !s.is_finite() || *s <= 0.0) {
        return Err(ValidationError::new(field("asset.speed"), format!("must be > 0, got {}", speed)).into());
    }
    if let Some(volume) = volume.filter(|v| !v.is_finite() || *v < 0.0) {
        return Err(ValidationError::new(field("asset.volume"), format!("must be >= 0, got {}", volume)).into());
    }

    Ok(())
}
