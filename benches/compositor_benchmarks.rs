//! Performance benchmarks for the compositor core
//!
//! These cover the per-frame and per-event paths: output layout,
//! hit testing, composition and screencopy pixel conversion.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use hollywood::{
    config::{DisplayConfig, DisplaySection, ShortcutSettings, UserConfig},
    output::OutputManager,
    protocol::screencopy::rgba_to_argb8888,
    render::{PixmapRenderer, Wallpaper},
    shortcuts::{KeyCombination, ShortcutAction, ShortcutManager},
    window::{Point, Size, Surface, SurfaceRegistry, SurfaceRole},
    ScreenInfo,
};

fn screens(count: usize) -> (Vec<ScreenInfo>, DisplayConfig) {
    let mut display = DisplayConfig::default();
    let screens = (0..count)
        .map(|i| {
            let name = format!("DP-{}", i + 1);
            display.set_section(
                &name,
                DisplaySection {
                    position_x: (i as i32 - count as i32 / 2) * 1920,
                    ..DisplaySection::default()
                },
            );
            ScreenInfo::new(name, 1920, 1080, 60_000)
        })
        .collect();
    (screens, display)
}

fn registry(count: usize) -> SurfaceRegistry {
    let mut registry = SurfaceRegistry::new();
    for i in 0..count {
        let surface = Surface::new(
            SurfaceRole::Toplevel,
            Point::new((i as i32 * 37) % 1600, (i as i32 * 23) % 900),
            Size::new(320, 240),
        )
        .with_server_decoration(true);
        registry.insert(surface);
    }
    registry
}

/// Benchmark layout normalization with negative configured positions
fn bench_output_positioning(c: &mut Criterion) {
    let mut group = c.benchmark_group("output_positioning");

    for count in [2, 4, 8].iter() {
        group.bench_with_input(format!("recalculate_{}_outputs", count), count, |b, &count| {
            b.iter_batched(
                || {
                    let (screens, display) = screens(count);
                    let mut outputs = OutputManager::new();
                    outputs.create_for_console(screens, &display, &UserConfig::default());
                    outputs
                },
                |mut outputs| {
                    outputs.recalculate_positioning();
                    black_box(outputs.output_at(Point::new(1920 * count as i32 - 1, 10)).is_some());
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

/// Benchmark topmost-surface lookup under the pointer
fn bench_surface_hit_testing(c: &mut Criterion) {
    let mut group = c.benchmark_group("surface_hit_testing");

    for count in [10, 100, 500].iter() {
        let surfaces = registry(*count);
        group.bench_function(format!("surface_at_{}_surfaces", count), |b| {
            b.iter(|| black_box(surfaces.surface_at(black_box(Point::new(800, 450)))));
        });
    }

    group.finish();
}

/// Benchmark one composited frame on the CPU renderer
fn bench_compose(c: &mut Criterion) {
    let (screens, display) = screens(1);
    let mut outputs = OutputManager::new();
    outputs.create_for_console(screens, &display, &UserConfig::default());
    let surfaces = registry(20);
    let wallpaper = Wallpaper::default();
    let mut renderer = PixmapRenderer::new();

    c.bench_function("compose_1080p_20_windows", |b| {
        b.iter(|| {
            for output in outputs.outputs_mut() {
                let geometry = output.geometry();
                output
                    .window_mut()
                    .compose(geometry, &surfaces, &wallpaper, &mut renderer)
                    .ok();
            }
        });
    });
}

/// Benchmark RGBA to ARGB8888 conversion for a full-output capture
fn bench_screencopy_conversion(c: &mut Criterion) {
    let (width, height) = (1920usize, 1080usize);
    let rgba = vec![0x7fu8; width * height * 4];

    c.bench_function("rgba_to_argb8888_1080p", |b| {
        b.iter(|| black_box(rgba_to_argb8888(&rgba, width, height, width * 4)));
    });
}

/// Benchmark shortcut table lookups
fn bench_shortcut_dispatch(c: &mut Criterion) {
    let shortcuts = ShortcutManager::new(&ShortcutSettings::default());
    let hit = KeyCombination::switch_window_default();
    let miss = KeyCombination::key(xkbcommon::xkb::keysyms::KEY_a);

    c.bench_function("shortcut_check_and_handle", |b| {
        let mut handled = 0u32;
        b.iter(|| {
            black_box(shortcuts.check_and_handle_combo(hit, &mut |_: ShortcutAction| handled += 1));
            black_box(shortcuts.check_and_handle_combo(miss, &mut |_: ShortcutAction| handled += 1));
        });
    });
}

criterion_group!(
    benches,
    bench_output_positioning,
    bench_surface_hit_testing,
    bench_compose,
    bench_screencopy_conversion,
    bench_shortcut_dispatch
);
criterion_main!(benches);
