use glam::Vec2;
use pixelsong::color::{polarize, Color};
use pixelsong::settings::{CameraSettings, ParticleSettings, Settings};
use pixelsong::sim::{
    advect, emit, playhead_beat, playhead_column, Cell, Conditioner, Cursor, Emission, Simulation,
};
use pixelsong::sound::default_instruments;
use std::collections::HashMap;

const DT: f32 = 1.0 / 30.0;

fn sim(w: usize, h: usize) -> Simulation {
    Simulation::new(w, h, &Settings::default(), default_instruments(), Some(3))
}

fn frame_with(w: usize, h: usize, lit: &[(usize, usize, Color)]) -> Vec<Color> {
    let mut frame = vec![Color::BLACK; w * h];
    for &(x, y, c) in lit {
        frame[x + y * w] = c;
    }
    frame
}

/// Every live handle's pixel count equals the number of cells pointing at it.
fn assert_shape_counts(sim: &Simulation) {
    let mut refs: HashMap<usize, u32> = HashMap::new();
    for cell in sim.cells() {
        if let Some(handle) = cell.shape {
            *refs.entry(handle.index()).or_default() += 1;
            assert!(
                sim.shapes().get(handle).is_some(),
                "cell points at a dead shape"
            );
        }
    }
    let mut live = 0usize;
    for (handle, shape) in sim.shapes().iter() {
        assert!(shape.pixels >= 1);
        assert_eq!(refs.get(&handle.index()).copied().unwrap_or(0), shape.pixels);
        live += 1;
    }
    assert_eq!(live, refs.len());
    let referenced = sim.cells().iter().filter(|c| c.shape.is_some()).count() as u32;
    let total: u32 = sim.shapes().iter().map(|(_, s)| s.pixels).sum();
    assert_eq!(total, referenced);
}

#[test]
fn polarize_is_a_clamp_at_zero_and_pushes_outward_at_one() {
    for i in 0..=40 {
        let v = -0.5 + i as f32 * 0.05;
        let clamped = v.clamp(0.0, 1.0);
        assert!((polarize(v, 0.0) - clamped).abs() < 1e-6, "v={v}");

        let pushed = polarize(v, 1.0);
        assert!((0.0..=1.0).contains(&pushed));
        assert!((pushed - 0.5).abs() >= (clamped - 0.5).abs() - 1e-6, "v={v}");
    }
}

#[test]
fn conditioner_thresholds_after_contrast() {
    let cond = Conditioner::new(CameraSettings::default());

    let (bright, valid) = cond.apply(Color::new(1.0, 0.2, 0.0));
    assert!(valid);
    assert_eq!(bright.r, 1.0);
    assert!(bright.g < 0.001);

    // 0.8^5 is about 0.33, below the 0.5 threshold.
    let (dim, valid) = cond.apply(Color::new(0.8, 0.8, 0.8));
    assert!(!valid);
    assert_eq!(dim, Color::BLACK);
}

#[test]
fn single_pixel_creates_a_shape_and_its_neighbour_joins_it() {
    let (w, h) = (4, 4);
    let red = Color::new(1.0, 0.0, 0.0);
    let mut sim = sim(w, h);

    sim.step(&frame_with(w, h, &[(2, 1, red)]), 0.0, DT);
    assert_eq!(sim.shapes().len(), 1);
    let handle = sim.cell(2, 1).and_then(|c| c.shape).expect("pixel should own a shape");
    let shape = sim.shapes().get(handle).expect("shape should be live");
    assert_eq!(shape.pixels, 1);
    assert_eq!(shape.color, red);

    sim.step(&frame_with(w, h, &[(2, 1, red), (2, 2, red)]), 0.0, DT);
    assert_eq!(sim.shapes().len(), 1);
    assert_eq!(sim.cell(2, 2).and_then(|c| c.shape), Some(handle));
    let shape = sim.shapes().get(handle).expect("shape should be live");
    assert_eq!(shape.pixels, 2);
    assert_eq!(shape.color, Color::new(2.0, 0.0, 0.0));
    assert_shape_counts(&sim);
}

#[test]
fn shape_dies_and_slot_is_reused_when_pixels_go_dark() {
    let (w, h) = (4, 4);
    let red = Color::new(1.0, 0.0, 0.0);
    let mut sim = sim(w, h);

    sim.step(&frame_with(w, h, &[(0, 0, red), (3, 3, red)]), 0.0, DT);
    assert_eq!(sim.shapes().len(), 2);

    sim.step(&frame_with(w, h, &[(3, 3, red)]), 0.0, DT);
    assert_eq!(sim.shapes().len(), 1);
    assert!(sim.cell(0, 0).is_some_and(|c| c.shape.is_none()));

    sim.step(&frame_with(w, h, &[(3, 3, red), (0, 0, red)]), 0.0, DT);
    assert_eq!(sim.shapes().len(), 2);
    assert_shape_counts(&sim);
}

#[test]
fn shape_counts_match_cell_references_under_random_frames() {
    let (w, h) = (24, 16);
    let mut sim = sim(w, h);
    let mut rng = fastrand::Rng::with_seed(11);

    for _ in 0..40 {
        let frame: Vec<Color> = (0..w * h)
            .map(|_| {
                if rng.f32() < 0.4 {
                    Color::new(rng.f32(), rng.f32(), 1.0)
                } else {
                    Color::BLACK
                }
            })
            .collect();
        sim.step(&frame, 0.0, DT);
        assert_shape_counts(&sim);
    }
}

#[test]
fn border_cells_output_the_united_color_and_interior_cells_the_inside_gain() {
    let (w, h) = (6, 6);
    let red = Color::new(1.0, 0.0, 0.0);
    let block: Vec<_> = (1..5)
        .flat_map(|y| (1..5).map(move |x| (x, y, red)))
        .collect();
    let frame = frame_with(w, h, &block);
    let mut sim = sim(w, h);

    sim.step(&frame, 0.0, DT);
    // Contribution is zero on the step a pixel joins.
    assert_eq!(sim.cell(1, 1).map(|c| c.shape_color), Some(Color::BLACK));

    sim.step(&frame, 0.0, DT);
    assert_eq!(sim.cell(1, 1).map(|c| c.shape_color), Some(red));
    assert_eq!(sim.cell(2, 2).map(|c| c.shape_color), Some(Color::BLACK));
}

#[test]
fn advection_takes_velocity_and_color_from_the_source() {
    let (w, h) = (4, 4);
    let settings = ParticleSettings::default();
    let mut cells = vec![Cell::default(); w * h];
    let src = 3 + w;
    cells[src].velocity = Vec2::new(-20.0, 0.0);
    cells[src].particle = Color::new(1.0, 0.0, 0.0);
    cells[src].particle_delta = 0.1;

    advect(&mut cells, w, h, &settings, 0.01);

    assert_eq!(cells[src].velocity, Vec2::ZERO);
    assert_eq!(cells[src].particle, Color::BLACK);
    assert_eq!(cells[src].particle_delta, 0.0);

    let dst = &cells[1 + w];
    assert!((dst.velocity.x + 19.0).abs() < 1e-3, "got {}", dst.velocity.x);
    assert!((dst.particle.r - 0.475).abs() < 1e-3, "got {}", dst.particle.r);
}

#[test]
fn slow_particles_accumulate_time_instead_of_moving() {
    let (w, h) = (4, 4);
    let settings = ParticleSettings {
        friction: 0.0,
        ..ParticleSettings::default()
    };
    let mut cells = vec![Cell::default(); w * h];
    cells[5].velocity = Vec2::new(2.0, 0.0);

    advect(&mut cells, w, h, &settings, 0.1);
    assert_eq!(cells[5].velocity, Vec2::new(2.0, 0.0));
    assert!((cells[5].particle_delta - 0.1).abs() < 1e-6);
}

#[test]
fn advection_wraps_across_the_grid_edge() {
    let (w, h) = (4, 4);
    let settings = ParticleSettings {
        friction: 0.0,
        ..ParticleSettings::default()
    };
    let mut cells = vec![Cell::default(); w * h];
    cells[0].velocity = Vec2::new(-10.0, 0.0);
    cells[0].particle_delta = 0.1;

    advect(&mut cells, w, h, &settings, 0.01);
    assert_eq!(cells[0].velocity, Vec2::ZERO);
    assert_eq!(cells[3].velocity, Vec2::new(-10.0, 0.0));
}

#[test]
fn particle_color_never_grows_without_emission() {
    let (w, h) = (16, 12);
    let settings = ParticleSettings::default();
    let mut rng = fastrand::Rng::with_seed(5);
    let mut cells: Vec<Cell> = (0..w * h)
        .map(|_| Cell {
            velocity: Vec2::new(rng.f32() * 80.0 - 40.0, rng.f32() * 80.0 - 40.0),
            particle: Color::new(rng.f32(), rng.f32(), rng.f32()),
            particle_delta: rng.f32() * 0.2,
            ..Cell::default()
        })
        .collect();

    let total = |cells: &[Cell]| cells.iter().map(|c| c.particle.sum()).sum::<f32>();
    let mut prev = total(&cells);
    for _ in 0..30 {
        advect(&mut cells, w, h, &settings, DT);
        let now = total(&cells);
        assert!(now <= prev + 1e-4, "{now} > {prev}");
        prev = now;
    }
    assert!(cells.iter().all(|c| c.velocity.is_finite() && c.particle.is_finite()));
}

#[test]
fn advection_zeroes_non_finite_velocity_and_color() {
    let (w, h) = (4, 4);
    let settings = ParticleSettings::default();
    let mut cells = vec![Cell::default(); w * h];
    cells[5].velocity = Vec2::new(f32::NAN, 3.0);
    cells[5].particle = Color::new(f32::INFINITY, 0.5, 0.0);
    cells[10].velocity = Vec2::new(f32::NEG_INFINITY, f32::NAN);
    cells[10].particle = Color::new(f32::NAN, f32::NAN, f32::NAN);

    advect(&mut cells, w, h, &settings, DT);

    assert_eq!(cells[5].velocity.x, 0.0);
    assert!(cells[5].velocity.y.is_finite());
    assert_eq!(cells[5].particle.r, 0.0);
    assert_eq!(cells[10].velocity, Vec2::ZERO);
    assert_eq!(cells[10].particle, Color::BLACK);
    assert!(cells.iter().all(|c| c.velocity.is_finite() && c.particle.is_finite()));
}

#[test]
fn non_finite_camera_pixels_never_reach_the_output() {
    let (w, h) = (8, 8);
    let mut sim = sim(w, h);
    let mut frame = vec![Color::new(1.0, 0.0, 0.0); w * h];
    frame[0] = Color::new(f32::NAN, 0.0, 0.0);
    frame[9] = Color::new(f32::INFINITY, 1.0, 0.0);
    frame[18] = Color::new(f32::NEG_INFINITY, f32::NAN, f32::INFINITY);
    frame[27] = Color::new(f32::NAN, f32::NAN, f32::NAN);

    for k in 0..8 {
        sim.step(&frame, k as f64 * 0.25, DT);
        assert!(sim.pixels().iter().all(|p| p.is_finite()), "step {k}");
        for cell in sim.cells() {
            assert!(cell.last.is_finite() && cell.read.is_finite(), "step {k}");
            assert!(cell.velocity.is_finite() && cell.particle.is_finite(), "step {k}");
        }
        assert!(sim.cursor().color().is_finite(), "step {k}");
    }
    assert!(!sim.cells()[27].valid);
}

#[test]
fn emission_lands_only_inside_the_grid() {
    let (w, h) = (4, 4);
    let settings = ParticleSettings::default();
    let mut rng = fastrand::Rng::with_seed(9);
    let mut cells = vec![Cell::default(); w * h];
    let emission = Emission {
        x: 0,
        y: 0,
        color: Color::new(0.0, 0.0, 1.0),
        radius: 4.0,
        count: 200,
    };

    emit(&mut cells, w, h, &emission, &settings, &mut rng);
    assert!(cells.iter().any(|c| c.particle.b > 0.0));
    assert!(cells.iter().all(|c| c.particle.is_finite() && c.velocity.is_finite()));
}

#[test]
fn playhead_column_follows_tempo_and_loop_length() {
    assert_eq!(playhead_beat(0.5, 120.0, 16), 12.0);
    assert_eq!(playhead_column(0.5, 120.0, 16, 128), 96);
    assert_eq!(playhead_column(0.0, 120.0, 16, 128), 0);
    // 30 beats at 120 bpm loop every quarter minute.
    assert_eq!(playhead_column(0.625, 120.0, 30, 120), 60);
    assert_eq!(playhead_column(0.875, 120.0, 30, 120), 60);
    assert_eq!(playhead_column(1.0, 120.0, 0, 128), 0);
}

#[test]
fn cursor_bar_lights_only_the_playhead_column() {
    let (w, h) = (8, 4);
    let mut sim = sim(w, h);
    sim.step(&vec![Color::BLACK; w * h], 0.0, DT);

    let column = sim.stats().column;
    assert_eq!(column, 0);
    for y in 0..h {
        assert!(sim.pixels()[column + y * w].max_channel() > 0.0);
        assert_eq!(sim.pixels()[1 + y * w], Color::BLACK);
    }
}

#[test]
fn cursor_moves_hue_along_the_short_arc() {
    let mut cursor = Cursor::new(Color::from_hsv(0.95, 1.0, 1.0));
    cursor.adapt(Color::from_hsv(0.05, 1.0, 1.0), 0.5, 1.0);
    // Halfway along the 0.1 wide arc through 0.
    assert!(cursor.hue() < 0.01 || cursor.hue() > 0.99, "hue {}", cursor.hue());
    assert!((cursor.value() - 1.0).abs() < 1e-6);
    assert!(cursor.color().is_finite());
}

#[test]
fn clear_drops_particles_and_blur() {
    let (w, h) = (8, 8);
    let mut sim = sim(w, h);
    sim.burst();
    assert!(sim.cells().iter().any(|c| c.particle.sum() > 0.0));

    sim.clear();
    assert!(sim.cells().iter().all(|c| c.particle == Color::BLACK && c.velocity == Vec2::ZERO));
    assert!(sim.pixels().iter().all(|p| *p == Color::BLACK));
}
