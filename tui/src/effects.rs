//! Modal animation effects for dialog overlays.

use ratatui::layout::Rect;

use cashier_engine::{ModalEffect, ModalEffectKind};

/// Transform a dialog's resting rectangle for the current animation frame.
#[must_use]
pub fn apply_modal_effect(effect: &ModalEffect, base: Rect, viewport: Rect) -> Rect {
    match effect.kind() {
        ModalEffectKind::PopScale => {
            let t = ease_out_cubic(effect.progress());
            scale_rect(base, 0.6 + 0.4 * t)
        }
        ModalEffectKind::Shake => {
            let t = effect.progress().clamp(0.0, 1.0);
            let decay = 1.0 - t;
            let offset =
                (f32::sin(t * std::f32::consts::TAU * SHAKE_OSCILLATIONS) * SHAKE_AMPLITUDE * decay)
                    .round() as i32;
            let left = i32::from(viewport.x);
            let right = left + i32::from(viewport.width);
            let max_x = (right - i32::from(base.width)).max(left);
            let x = (i32::from(base.x) + offset).clamp(left, max_x) as u16;
            Rect { x, ..base }
        }
    }
}

const SHAKE_OSCILLATIONS: f32 = 4.0;
const SHAKE_AMPLITUDE: f32 = 3.0;

fn scale_rect(base: Rect, scale: f32) -> Rect {
    let width = ((f32::from(base.width) * scale).round() as u16)
        .max(1)
        .min(base.width);
    let height = ((f32::from(base.height) * scale).round() as u16)
        .max(1)
        .min(base.height);
    Rect {
        x: base.x + (base.width.saturating_sub(width) / 2),
        y: base.y + (base.height.saturating_sub(height) / 2),
        width,
        height,
    }
}

fn ease_out_cubic(t: f32) -> f32 {
    let inv = 1.0 - t.clamp(0.0, 1.0);
    1.0 - inv * inv * inv
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    const VIEWPORT: Rect = Rect {
        x: 0,
        y: 0,
        width: 80,
        height: 24,
    };
    const BASE: Rect = Rect {
        x: 20,
        y: 8,
        width: 40,
        height: 8,
    };

    #[test]
    fn pop_scale_starts_small_and_settles() {
        let mut effect = ModalEffect::pop_scale(Duration::from_millis(700));
        let first = apply_modal_effect(&effect, BASE, VIEWPORT);
        assert!(first.width < BASE.width);
        assert!(first.height < BASE.height);
        assert!(first.x > BASE.x);

        effect.advance(Duration::from_millis(700));
        assert_eq!(apply_modal_effect(&effect, BASE, VIEWPORT), BASE);
    }

    #[test]
    fn shake_stays_inside_viewport() {
        let mut effect = ModalEffect::shake(Duration::from_millis(360));
        let edge = Rect { x: 0, ..BASE };
        for _ in 0..36 {
            let rect = apply_modal_effect(&effect, edge, VIEWPORT);
            assert!(rect.x + rect.width <= VIEWPORT.width);
            assert_eq!(rect.y, edge.y);
            effect.advance(Duration::from_millis(10));
        }
        assert_eq!(apply_modal_effect(&effect, BASE, VIEWPORT), BASE);
    }

    #[test]
    fn scale_rect_never_collapses() {
        let tiny = Rect::new(5, 5, 1, 1);
        assert_eq!(scale_rect(tiny, 0.1), tiny);
    }
}
