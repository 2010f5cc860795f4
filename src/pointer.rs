//! Pointer tracking and splat generation.
//!
//! Event handlers only record state and queue [`Splat`]s; the frame loop
//! drains the queue, so nothing here touches the fields directly.

use glam::{vec2, vec3, UVec2, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::Rng;

use crate::config::{ColorMode, SimulationConfig};
use crate::splat::Splat;

/// Scale applied to generated colors so dye builds up gradually.
pub const COLOR_INTENSITY: f32 = 0.15;
/// Extra dye brightness of the burst emitted on pointer down.
pub const CLICK_INTENSITY: f32 = 10.0;
const GOLDEN_RATIO_CONJUGATE: f32 = 0.618_034;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointerPhase {
    Idle,
    Down,
    Moving,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Pointer {
    pub id: i32,
    pub texcoord: Vec2,
    pub prev_texcoord: Vec2,
    pub delta: Vec2,
    pub down: bool,
    pub moved: bool,
    pub color: Vec3,
}

impl Pointer {
    fn new(id: i32) -> Self {
        Self {
            id,
            texcoord: Vec2::ZERO,
            prev_texcoord: Vec2::ZERO,
            delta: Vec2::ZERO,
            down: false,
            moved: false,
            color: Vec3::ZERO,
        }
    }

    #[must_use]
    pub fn phase(&self) -> PointerPhase {
        match (self.down, self.moved) {
            (false, _) => PointerPhase::Idle,
            (true, false) => PointerPhase::Down,
            (true, true) => PointerPhase::Moving,
        }
    }

    fn open(&mut self, texcoord: Vec2, color: Vec3) {
        self.down = true;
        self.moved = false;
        self.texcoord = texcoord;
        self.prev_texcoord = texcoord;
        self.delta = Vec2::ZERO;
        self.color = color;
    }
}

/// Shrinks the delta along the longer axis so equal physical motion yields
/// equal force in both directions.
#[must_use]
pub fn correct_delta(delta: Vec2, aspect: f32) -> Vec2 {
    if aspect < 1.0 {
        vec2(delta.x * aspect, delta.y)
    } else if aspect > 1.0 {
        vec2(delta.x, delta.y / aspect)
    } else {
        delta
    }
}

/// HSV with all components in `[0, 1]` to linear RGB.
#[must_use]
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Vec3 {
    let h = h.rem_euclid(1.0) * 6.0;
    let sector = h.floor();
    let f = h - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    match sector as u32 {
        0 => vec3(v, t, p),
        1 => vec3(q, v, p),
        2 => vec3(p, v, t),
        3 => vec3(p, q, v),
        4 => vec3(t, p, v),
        _ => vec3(v, p, q),
    }
}

/// Picks pointer colors and decides when they refresh.
#[derive(Clone, Debug)]
pub struct ColorCycle {
    mode: ColorMode,
    speed: f32,
    hue: f32,
    timer: f32,
}

impl ColorCycle {
    pub fn new(mode: ColorMode, speed: f32, rng: &mut impl Rng) -> Self {
        Self {
            mode,
            speed,
            hue: rng.gen(),
            timer: 0.0,
        }
    }

    pub fn next_color(&mut self, rng: &mut impl Rng) -> Vec3 {
        let base = match &self.mode {
            ColorMode::Single(color) => *color,
            ColorMode::Custom(palette) if !palette.is_empty() => palette[rng.gen_range(0..palette.len())],
            ColorMode::Rainbow | ColorMode::Custom(_) => {
                self.hue = (self.hue + GOLDEN_RATIO_CONJUGATE).fract();
                hsv_to_rgb(self.hue, 1.0, 1.0)
            }
        };
        base * COLOR_INTENSITY
    }

    /// Advances the refresh timer. Returns true when it wraps past one.
    pub fn tick(&mut self, dt: f32) -> bool {
        self.timer += dt * self.speed;
        if self.timer >= 1.0 {
            self.timer = self.timer.fract();
            true
        } else {
            false
        }
    }
}

/// Tracks every pointer and queues the splats their motion produces.
pub struct PointerInput {
    pointers: Vec<Pointer>,
    pending: Vec<Splat>,
    surface: UVec2,
    splat_force: f32,
    hover_trail: bool,
    colors: ColorCycle,
    rng: StdRng,
}

impl PointerInput {
    pub fn new(config: &SimulationConfig, mut rng: StdRng) -> Self {
        let colors = ColorCycle::new(config.color_mode.clone(), config.color_update_speed, &mut rng);
        Self {
            pointers: vec![Pointer::new(-1)],
            pending: Vec::new(),
            surface: UVec2::ONE,
            splat_force: config.splat_force,
            hover_trail: config.hover_trail,
            colors,
            rng,
        }
    }

    /// Surface size in device pixels; positions are given in the same units.
    pub fn set_surface_size(&mut self, size: UVec2) {
        self.surface = size.max(UVec2::ONE);
    }

    #[must_use]
    pub fn aspect(&self) -> f32 {
        let size = self.surface.as_vec2();
        size.x / size.y
    }

    #[must_use]
    pub fn pointer(&self, id: i32) -> Option<&Pointer> {
        self.pointers.iter().find(|p| p.id == id)
    }

    pub fn pointers(&self) -> &[Pointer] {
        &self.pointers
    }

    /// Number of splats waiting for the next frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn pointer_down(&mut self, id: i32, position: Vec2) {
        let texcoord = self.texcoord(position);
        let color = self.colors.next_color(&mut self.rng);
        self.slot(id).open(texcoord, color);

        let force = vec2(
            10.0 * (self.rng.gen::<f32>() - 0.5),
            30.0 * (self.rng.gen::<f32>() - 0.5),
        );
        self.pending.push(Splat {
            point: texcoord,
            force,
            color: color * CLICK_INTENSITY,
        });
    }

    pub fn pointer_move(&mut self, id: i32, position: Vec2) {
        let texcoord = self.texcoord(position);
        let aspect = self.aspect();
        let tracked = self.pointers.iter().position(|p| p.id == id && p.down);
        let index = match tracked {
            Some(index) => index,
            None if self.hover_trail => {
                let color = self.colors.next_color(&mut self.rng);
                self.slot(id).open(texcoord, color);
                return;
            }
            None => return,
        };

        let pointer = &mut self.pointers[index];
        pointer.prev_texcoord = pointer.texcoord;
        pointer.texcoord = texcoord;
        pointer.delta = correct_delta(texcoord - pointer.prev_texcoord, aspect);
        pointer.moved = pointer.delta.x.abs() > 0.0 || pointer.delta.y.abs() > 0.0;
        if pointer.moved {
            self.pending.push(Splat {
                point: pointer.texcoord,
                force: pointer.delta * self.splat_force,
                color: pointer.color,
            });
        }
    }

    pub fn pointer_up(&mut self, id: i32) {
        if let Some(pointer) = self.pointers.iter_mut().find(|p| p.id == id) {
            pointer.down = false;
            pointer.moved = false;
        }
    }

    pub fn pointer_leave(&mut self, id: i32) {
        self.pointer_up(id);
    }

    /// Takes the queued splats and clears the per-frame motion flags.
    pub fn take_splats(&mut self) -> Vec<Splat> {
        for pointer in &mut self.pointers {
            pointer.moved = false;
        }
        std::mem::take(&mut self.pending)
    }

    /// Refreshes every pointer's color whenever the cycle timer wraps.
    pub fn update_colors(&mut self, dt: f32) {
        if !self.colors.tick(dt) {
            return;
        }
        for pointer in &mut self.pointers {
            pointer.color = self.colors.next_color(&mut self.rng);
        }
    }

    fn texcoord(&self, position: Vec2) -> Vec2 {
        let size = self.surface.as_vec2();
        vec2(position.x / size.x, 1.0 - position.y / size.y)
    }

    fn slot(&mut self, id: i32) -> &mut Pointer {
        let index = self
            .pointers
            .iter()
            .position(|p| p.id == id)
            .or_else(|| self.pointers.iter().position(|p| !p.down));
        match index {
            Some(index) => {
                self.pointers[index].id = id;
                &mut self.pointers[index]
            }
            None => {
                self.pointers.push(Pointer::new(id));
                let last = self.pointers.len() - 1;
                &mut self.pointers[last]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;

    use super::*;

    fn input(config: &SimulationConfig) -> PointerInput {
        let mut input = PointerInput::new(config, StdRng::seed_from_u64(7));
        input.set_surface_size(UVec2::new(200, 100));
        input
    }

    #[test]
    fn down_move_up_walks_the_phases() {
        let mut input = input(&SimulationConfig::default());
        input.pointer_down(1, vec2(50.0, 50.0));
        let pointer = input.pointer(1).unwrap();
        assert_eq!(pointer.phase(), PointerPhase::Down);
        assert_eq!(pointer.texcoord, vec2(0.25, 0.5));
        assert_eq!(pointer.delta, Vec2::ZERO);
        assert_eq!(input.take_splats().len(), 1);

        input.pointer_move(1, vec2(70.0, 50.0));
        assert_eq!(input.pointer(1).unwrap().phase(), PointerPhase::Moving);
        input.pointer_up(1);
        assert_eq!(input.pointer(1).unwrap().phase(), PointerPhase::Idle);
    }

    #[test]
    fn every_effective_move_queues_one_splat() {
        let config = SimulationConfig::default();
        let mut input = input(&config);
        input.pointer_down(1, vec2(100.0, 50.0));
        input.take_splats();

        input.pointer_move(1, vec2(120.0, 50.0));
        input.pointer_move(1, vec2(120.0, 40.0));
        // no displacement, no splat
        input.pointer_move(1, vec2(120.0, 40.0));
        let splats = input.take_splats();
        assert_eq!(splats.len(), 2);
        assert!((splats[0].force - vec2(0.1 * config.splat_force, 0.0)).length() < 1e-2);
        // landscape surface halves the vertical delta
        assert!((splats[1].force - vec2(0.0, 0.05 * config.splat_force)).length() < 1e-2);
        assert!(input.pointers().iter().all(|p| !p.moved));
    }

    #[test]
    fn idle_pointer_motion_is_ignored() {
        let mut input = input(&SimulationConfig::default());
        input.pointer_move(3, vec2(10.0, 10.0));
        assert_eq!(input.pending(), 0);

        input.pointer_down(3, vec2(10.0, 10.0));
        input.pointer_leave(3);
        input.take_splats();
        input.pointer_move(3, vec2(40.0, 10.0));
        assert_eq!(input.pending(), 0);
    }

    #[test]
    fn hover_trail_opens_pointer_on_first_move() {
        let config = SimulationConfig {
            hover_trail: true,
            ..SimulationConfig::default()
        };
        let mut input = input(&config);
        input.pointer_move(0, vec2(10.0, 10.0));
        assert_eq!(input.pending(), 0);
        assert_eq!(input.pointer(0).unwrap().phase(), PointerPhase::Down);
        input.pointer_move(0, vec2(30.0, 10.0));
        assert_eq!(input.pending(), 1);
    }

    #[test]
    fn pointers_are_tracked_independently() {
        let mut input = input(&SimulationConfig::default());
        input.pointer_down(1, vec2(10.0, 10.0));
        input.pointer_down(2, vec2(150.0, 90.0));
        input.pointer_up(1);
        assert_eq!(input.pointer(1).unwrap().phase(), PointerPhase::Idle);
        assert_eq!(input.pointer(2).unwrap().phase(), PointerPhase::Down);
        // a released slot is reused
        input.pointer_down(5, vec2(0.0, 0.0));
        assert!(input.pointer(1).is_none());
        assert_eq!(input.pointers().len(), 2);
    }

    #[test]
    fn delta_correction_by_aspect() {
        assert_eq!(correct_delta(vec2(0.2, 0.2), 2.0), vec2(0.2, 0.1));
        assert_eq!(correct_delta(vec2(0.2, 0.2), 0.5), vec2(0.1, 0.2));
        assert_eq!(correct_delta(vec2(0.2, 0.2), 1.0), vec2(0.2, 0.2));
    }

    #[test]
    fn hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), vec3(1.0, 0.0, 0.0));
        assert!((hsv_to_rgb(1.0 / 3.0, 1.0, 1.0) - vec3(0.0, 1.0, 0.0)).length() < 1e-5);
        assert!((hsv_to_rgb(2.0 / 3.0, 1.0, 1.0) - vec3(0.0, 0.0, 1.0)).length() < 1e-5);
        assert_eq!(hsv_to_rgb(0.5, 0.0, 0.5), Vec3::splat(0.5));
    }

    #[test]
    fn color_modes() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut single = ColorCycle::new(ColorMode::Single(vec3(1.0, 0.0, 0.0)), 10.0, &mut rng);
        assert_eq!(single.next_color(&mut rng), vec3(COLOR_INTENSITY, 0.0, 0.0));

        let palette = vec![vec3(0.0, 1.0, 0.0), vec3(0.0, 0.0, 1.0)];
        let mut custom = ColorCycle::new(ColorMode::Custom(palette.clone()), 10.0, &mut rng);
        for _ in 0..8 {
            let color = custom.next_color(&mut rng) / COLOR_INTENSITY;
            assert!(palette.iter().any(|p| (*p - color).length() < 1e-5));
        }

        let mut rainbow = ColorCycle::new(ColorMode::Custom(Vec::new()), 10.0, &mut rng);
        let a = rainbow.next_color(&mut rng);
        let b = rainbow.next_color(&mut rng);
        assert_ne!(a, b);
        assert!((a.max_element() - COLOR_INTENSITY).abs() < 1e-5);
    }

    #[test]
    fn colors_refresh_when_timer_wraps() {
        let config = SimulationConfig {
            color_update_speed: 10.0,
            ..SimulationConfig::default()
        };
        let mut input = input(&config);
        input.pointer_down(1, vec2(10.0, 10.0));
        let before = input.pointer(1).unwrap().color;
        input.update_colors(0.05);
        assert_eq!(input.pointer(1).unwrap().color, before);
        input.update_colors(0.06);
        assert_ne!(input.pointer(1).unwrap().color, before);
    }
}
