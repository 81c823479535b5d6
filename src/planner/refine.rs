//! Coordinate refinement.
//!
//! Resolving a `Target` to a tap goes through three tiers:
//!
//! 1. an element in the current index whose text matches the target
//! 2. structured coordinate queries to the model, at most
//!    `structured_attempts` per target over the whole run
//! 3. the device profile's anchor plus one probe offset per step, at most
//!    `probe_attempts` per target
//!
//! When all tiers are spent the target resolves to `Action::Failed`, so a
//! target can cost at most `structured_attempts + probe_attempts` model
//! queries and probe taps before the run ends.

use std::io::Cursor;
use tracing::{debug, info, warn};

use crate::action::Action;
use crate::config::{DeviceProfile, PlannerSettings};
use crate::elements::ElementIndex;
use crate::response::{parse_coordinate, snippet};
use crate::vlm::{InferenceService, PromptKind};

use super::Target;
use super::progress::GoalProgress;

/// Width and height of a PNG screenshot
pub fn screen_size(png: &[u8]) -> Option<(u32, u32)> {
    image::io::Reader::new(Cursor::new(png))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

pub struct Refiner<'a> {
    vlm: &'a dyn InferenceService,
    settings: &'a PlannerSettings,
    profile: &'a DeviceProfile,
}

impl<'a> Refiner<'a> {
    pub fn new(
        vlm: &'a dyn InferenceService,
        settings: &'a PlannerSettings,
        profile: &'a DeviceProfile,
    ) -> Self {
        Self { vlm, settings, profile }
    }

    pub fn resolve(
        &self,
        target: Target,
        elements: &ElementIndex,
        screenshot: &[u8],
        mut progress: GoalProgress,
    ) -> (Action, GoalProgress) {
        if let Some(element) = elements.find_any_text(target.needles()) {
            debug!(?target, index = element.index, "target found in element index");
            return (Action::tap_index(element.index as i64), progress);
        }

        let (width, height) =
            screen_size(screenshot).unwrap_or((self.profile.width, self.profile.height));
        let mut state = progress.refine_state(target);

        while state.structured < self.settings.structured_attempts {
            let attempt = state.structured;
            state.structured += 1;
            progress.refine.insert(target, state);

            let prompt = locate_prompt(target, width, height);
            // Retries sample a little to avoid repeating the same wrong answer
            let temperature = (attempt as f32 * 0.2).min(0.6);
            match self.vlm.infer(Some(screenshot), &prompt, temperature) {
                Ok(reply) => match parse_coordinate(&reply) {
                    Some((x, y)) if in_bounds(x, y, width, height) => {
                        info!(?target, x, y, attempt = attempt + 1, "located target");
                        return (Action::tap(x, y), progress);
                    }
                    Some((x, y)) => {
                        warn!(?target, x, y, width, height, "located coordinate off screen")
                    }
                    None => warn!(?target, reply = %snippet(&reply), "no coordinate in locate reply"),
                },
                Err(e) => warn!(?target, error = %e, "locate call failed"),
            }
        }

        if let Some((ax, ay)) = self.profile.anchor(target) {
            let probe = state.probes as usize;
            if state.probes < self.settings.probe_attempts {
                if let Some((dx, dy)) = self.profile.probe_offsets.get(probe) {
                    state.probes += 1;
                    progress.refine.insert(target, state);
                    let x = (ax + dx).clamp(0, width.saturating_sub(1) as i32);
                    let y = (ay + dy).clamp(0, height.saturating_sub(1) as i32);
                    info!(?target, x, y, probe = probe + 1, profile = %self.profile.name, "probing anchor");
                    return (Action::tap(x, y), progress);
                }
            }
        }

        progress.fail(format!(
            "could not locate {} after {} coordinate queries and {} probes",
            target.description(),
            state.structured,
            state.probes
        ));
        (Action::Failed, progress)
    }
}

fn in_bounds(x: i32, y: i32, width: u32, height: u32) -> bool {
    x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height
}

fn locate_prompt(target: Target, width: u32, height: u32) -> String {
    format!(
        r#"{role}
The screenshot is {width}x{height} pixels. Find the exact pixel to tap {description}.
Return ONLY a JSON object, no code fences:
- if visible: {{"found": true, "x": <int>, "y": <int>}}
- if not visible: {{"found": false}}"#,
        role = PromptKind::Locate.role(),
        description = target.description(),
    )
}
