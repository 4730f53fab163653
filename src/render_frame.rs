use std::{collections::HashSet, path::Path, sync::Arc};

use image::RgbaImage;
use kurbo::Rect;

use crate::{
    core::{Millis, Viewport},
    error::GiftboxResult,
    resolve::{self, DisplayRef},
    surface::Surface,
    timeline::{PresentationScript, StageView},
};

/// Decoded rasters for every display reference a playback run can show.
/// Prepared once before rendering; references that fail to decode are simply
/// absent and render as nothing.
#[derive(Debug, Default)]
pub struct FrameAssets {
    entries: Vec<(DisplayRef, Arc<RgbaImage>)>,
}

impl FrameAssets {
    pub fn prepare(script: &PresentationScript, asset_root: Option<&Path>) -> Self {
        let mut wanted = vec![
            script.giver_image.clone(),
            script.receiver_image.clone(),
            script.gift_image.clone(),
            DisplayRef::path(resolve::WAIT_BACKGROUND),
            DisplayRef::path(resolve::RESULT_BACKGROUND),
            DisplayRef::path(resolve::BOX_CLOSED_IMAGE),
            DisplayRef::path(resolve::BOX_OPEN_IMAGE),
        ];
        let mut seen = HashSet::new();
        wanted.retain(|r| seen.insert(r.clone()));

        let mut entries = Vec::new();
        for display in wanted {
            match decode_display(&display, asset_root) {
                Some(img) => entries.push((display, Arc::new(img))),
                None => {
                    let display_ref = &display;
                    tracing::debug!(display = ?display_ref, "display ref not decodable, will render empty");
                }
            }
        }
        Self { entries }
    }

    pub fn lookup(&self, display: &DisplayRef) -> Option<&Arc<RgbaImage>> {
        self.entries
            .iter()
            .find(|(key, _)| key == display)
            .map(|(_, img)| img)
    }
}

fn decode_display(display: &DisplayRef, asset_root: Option<&Path>) -> Option<RgbaImage> {
    let bytes = match display {
        DisplayRef::Data(url) => crate::compress::decode_data_url(url).ok()?,
        DisplayRef::Bytes(bytes) => bytes.as_ref().clone(),
        DisplayRef::Path(rel) => {
            let root = asset_root?;
            std::fs::read(root.join(rel)).ok()?
        }
    };
    Some(image::load_from_memory(&bytes).ok()?.to_rgba8())
}

const BACKDROP_RGB: [u8; 3] = [24, 24, 32];
const BUBBLE_RGBA: [u8; 4] = [255, 255, 255, 230];
const CREATOR_BAR_RGBA: [u8; 4] = [12, 12, 16, 200];
const FADE_DIM: f64 = 0.45;
/// Shake half-period; the box flips sides every interval.
const SHAKE_PERIOD_MS: u64 = 160;

/// Renders the presentation's current visual state into an RGBA surface.
/// Purely a consumer of the playback engine's output: missing assets render
/// as flat fills, never as errors.
pub fn render_stage(
    view: &StageView,
    script: &PresentationScript,
    assets: &FrameAssets,
    canvas: Viewport,
    at: Millis,
) -> GiftboxResult<Surface> {
    let mut surface = Surface::solid(canvas.width, canvas.height, BACKDROP_RGB)?;
    let cw = f64::from(canvas.width);
    let ch = f64::from(canvas.height);

    if let Some(bg) = assets.lookup(&view.background) {
        surface.draw_image_scaled(bg, cover_rect(canvas, bg.width(), bg.height()));
    }

    if view.show_box && !view.chat {
        let box_ref = if view.open_box {
            DisplayRef::path(resolve::BOX_OPEN_IMAGE)
        } else {
            DisplayRef::path(resolve::BOX_CLOSED_IMAGE)
        };
        let shake = if view.box_shaking {
            let phase = (at.0 / SHAKE_PERIOD_MS) % 2;
            if phase == 0 { -6.0 } else { 6.0 }
        } else {
            0.0
        };
        let side = cw * 0.4;
        let cx = cw / 2.0 + shake;
        let cy = ch * 0.62;
        let box_rect = Rect::new(cx - side / 2.0, cy - side / 2.0, cx + side / 2.0, cy + side / 2.0);
        if let Some(img) = assets.lookup(&box_ref) {
            surface.draw_image_scaled(img, box_rect);
        } else {
            surface.fill_rect(box_rect, [180, 60, 60, 255]);
        }

        if view.reveal {
            let gift_side = cw * 0.5;
            let gift_rect = Rect::new(
                cw / 2.0 - gift_side / 2.0,
                ch * 0.32 - gift_side / 2.0,
                cw / 2.0 + gift_side / 2.0,
                ch * 0.32 + gift_side / 2.0,
            );
            match assets.lookup(&script.gift_image) {
                Some(img) => surface.draw_image_scaled(img, gift_rect),
                None => surface.fill_rect(gift_rect, [230, 200, 90, 255]),
            }
        }
    }

    if view.reveal && !view.chat {
        draw_bubble_column(&mut surface, canvas, &view.sender_reaction, true);
        draw_bubble_column(&mut surface, canvas, &view.receiver_reaction, false);
    }
    if view.chat {
        draw_chat_stack(&mut surface, canvas, view);
    }

    if view.fade {
        surface.dim(FADE_DIM);
    }

    if !view.creator_frame_hidden {
        surface.fill_rect(Rect::new(0.0, ch - 64.0, cw, ch), CREATOR_BAR_RGBA);
    }

    Ok(surface)
}

fn cover_rect(canvas: Viewport, img_w: u32, img_h: u32) -> Rect {
    let cw = f64::from(canvas.width);
    let ch = f64::from(canvas.height);
    let scale = (cw / f64::from(img_w)).max(ch / f64::from(img_h));
    let w = f64::from(img_w) * scale;
    let h = f64::from(img_h) * scale;
    let x = (cw - w) / 2.0;
    let y = (ch - h) / 2.0;
    Rect::new(x, y, x + w, y + h)
}

fn draw_bubble_column(
    surface: &mut Surface,
    canvas: Viewport,
    bubbles: &[crate::chat::ChatBubble],
    left: bool,
) {
    let cw = f64::from(canvas.width);
    let width = cw * 0.42;
    let height = 72.0;
    let gap = 12.0;
    let x0 = if left { 16.0 } else { cw - width - 16.0 };
    for (i, _) in bubbles.iter().enumerate() {
        let y0 = 96.0 + (height + gap) * i as f64;
        surface.fill_rect(Rect::new(x0, y0, x0 + width, y0 + height), BUBBLE_RGBA);
    }
}

fn draw_chat_stack(surface: &mut Surface, canvas: Viewport, view: &StageView) {
    let cw = f64::from(canvas.width);
    let ch = f64::from(canvas.height);
    let width = cw * 0.7;
    let height = 84.0;
    let gap = 14.0;
    for (i, bubble) in view.chat_layer.iter().enumerate() {
        let left = matches!(bubble.align, crate::chat::BubbleAlign::Giver);
        let x0 = if left { 20.0 } else { cw - width - 20.0 };
        let y0 = ch * 0.55 + (height + gap) * i as f64;
        surface.fill_rect(Rect::new(x0, y0, x0 + width, y0 + height), BUBBLE_RGBA);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeline::{Player, PresentationScript};

    fn assets() -> FrameAssets {
        // No asset root: everything renders as flat fills.
        FrameAssets::prepare(&PresentationScript::from_session(None, None), None)
    }

    #[test]
    fn renders_without_any_assets() {
        let mut p = Player::new(PresentationScript::from_session(None, None));
        p.tap(Millis(0));
        p.advance_to(Millis(5_000));
        let frame = render_stage(
            p.view(),
            p.script(),
            &assets(),
            Viewport::new(72, 128).unwrap(),
            Millis(5_000),
        )
        .unwrap();
        assert_eq!(frame.width, 72);
        assert_eq!(frame.height, 128);
    }

    #[test]
    fn fade_dims_the_frame() {
        let script = PresentationScript::from_session(None, None);
        let view = StageView::baseline();
        let canvas = Viewport::new(16, 16).unwrap();
        let lit = render_stage(&view, &script, &assets(), canvas, Millis(0)).unwrap();
        let mut faded_view = view.clone();
        faded_view.fade = true;
        let faded = render_stage(&faded_view, &script, &assets(), canvas, Millis(0)).unwrap();
        let lit_px = lit.to_rgba_image().unwrap().get_pixel(8, 2).0;
        let faded_px = faded.to_rgba_image().unwrap().get_pixel(8, 2).0;
        assert!(faded_px[2] < lit_px[2]);
    }

    #[test]
    fn cover_rect_fills_canvas() {
        let canvas = Viewport::new(720, 1280).unwrap();
        let r = cover_rect(canvas, 100, 100);
        assert!(r.x0 <= 0.0 && r.y0 <= 0.0);
        assert!(r.x1 >= 720.0 && r.y1 >= 1280.0);
    }
}
