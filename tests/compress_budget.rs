use giftbox::{EncodeKind, Surface, compress};

fn noisy_surface(width: u32, height: u32) -> Surface {
    let mut img = image::RgbaImage::new(width, height);
    let mut state = 0x9e37_79b9_7f4a_7c15u64;
    for px in img.pixels_mut() {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let b = state.to_le_bytes();
        *px = image::Rgba([b[0], b[1], b[2], 255]);
    }
    Surface::from_rgba_image(&img)
}

#[test]
fn always_terminates_for_any_budget() {
    let surface = noisy_surface(48, 48);
    for max_bytes in [1usize, 16, 512, 4096, 1 << 20] {
        for kind in [EncodeKind::Png, EncodeKind::Jpeg] {
            let blob = compress(&surface, kind, max_bytes).unwrap();
            assert!(!blob.is_empty(), "kind {kind:?} budget {max_bytes}");
        }
    }
}

#[test]
fn generous_budget_is_always_met() {
    let surface = noisy_surface(64, 64);
    for kind in [EncodeKind::Png, EncodeKind::Jpeg] {
        let blob = compress(&surface, kind, 1 << 20).unwrap();
        assert!(blob.len() <= 1 << 20);
    }
}

#[test]
fn moderate_squeeze_lands_under_budget() {
    // Large enough that quality/resolution stepping has real room before the
    // scale floor, so the byte bound itself must hold.
    let surface = noisy_surface(128, 128);
    let unconstrained = compress(&surface, EncodeKind::Jpeg, usize::MAX).unwrap();
    let budget = unconstrained.len() * 3 / 4;
    let squeezed = compress(&surface, EncodeKind::Jpeg, budget).unwrap();
    assert!(
        squeezed.len() <= budget,
        "{} > {}",
        squeezed.len(),
        budget
    );
}

#[test]
fn one_pixel_surface_survives_the_loop() {
    let surface = Surface::solid(1, 1, [255, 0, 255]).unwrap();
    let blob = compress(&surface, EncodeKind::Png, 1).unwrap();
    assert!(!blob.is_empty());
}
