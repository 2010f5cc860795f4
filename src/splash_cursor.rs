//! Browser entry point: mounts the simulation on a canvas, forwards
//! pointer events and drives it from `requestAnimationFrame`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::{Context, Result};
use glam::{vec2, vec3, Vec2, Vec3};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{HtmlCanvasElement, PointerEvent};

use crate::config::{ColorMode, SimulationConfig};
use crate::pointer::PointerInput;
use crate::simulation::Simulation;
use crate::webgl::{js_error, WebGlBackend};

type SharedSimulation = Rc<RefCell<Simulation<WebGlBackend>>>;
type FrameCallback = Closure<dyn FnMut(f64)>;

/// Options accepted by [`SplashCursor::mount`]. Anything left unset keeps
/// its default.
#[wasm_bindgen]
#[derive(Clone, Default)]
pub struct SplashOptions {
    config: SimulationConfig,
}

#[wasm_bindgen]
impl SplashOptions {
    #[wasm_bindgen(constructor)]
    #[must_use]
    pub fn new() -> SplashOptions {
        SplashOptions::default()
    }

    pub fn set_sim_resolution(&mut self, value: u32) {
        self.config.sim_resolution = value;
    }

    pub fn set_dye_resolution(&mut self, value: u32) {
        self.config.dye_resolution = value;
    }

    pub fn set_density_dissipation(&mut self, value: f32) {
        self.config.density_dissipation = value;
    }

    pub fn set_velocity_dissipation(&mut self, value: f32) {
        self.config.velocity_dissipation = value;
    }

    pub fn set_pressure(&mut self, value: f32) {
        self.config.pressure = value;
    }

    pub fn set_pressure_iterations(&mut self, value: usize) {
        self.config.pressure_iterations = value;
    }

    pub fn set_curl(&mut self, value: f32) {
        self.config.curl = value;
    }

    pub fn set_splat_radius(&mut self, value: f32) {
        self.config.splat_radius = value;
    }

    pub fn set_splat_force(&mut self, value: f32) {
        self.config.splat_force = value;
    }

    pub fn set_shading(&mut self, value: bool) {
        self.config.shading = value;
    }

    pub fn set_color_update_speed(&mut self, value: f32) {
        self.config.color_update_speed = value;
    }

    pub fn set_back_color(&mut self, r: f32, g: f32, b: f32) {
        self.config.back_color = vec3(r, g, b);
    }

    pub fn set_transparent(&mut self, value: bool) {
        self.config.transparent = value;
    }

    /// Longest timestep in seconds a single frame may advance.
    pub fn set_max_dt(&mut self, value: f32) {
        self.config.max_dt = value;
    }

    pub fn set_hover_trail(&mut self, value: bool) {
        self.config.hover_trail = value;
    }

    pub fn set_rainbow(&mut self) {
        self.config.color_mode = ColorMode::Rainbow;
    }

    pub fn set_single_color(&mut self, r: f32, g: f32, b: f32) {
        self.config.color_mode = ColorMode::Single(vec3(r, g, b));
    }

    /// Flat `[r, g, b, r, g, b, ...]` palette; a trailing partial triple
    /// is ignored.
    pub fn set_palette(&mut self, rgb: &[f32]) {
        self.config.color_mode = ColorMode::Custom(palette(rgb));
    }
}

fn palette(rgb: &[f32]) -> Vec<Vec3> {
    rgb.chunks_exact(3).map(Vec3::from_slice).collect()
}

#[wasm_bindgen]
pub struct SplashCursor {
    mounted: Option<Mounted>,
}

#[wasm_bindgen]
impl SplashCursor {
    /// Starts the effect on `canvas`. Failure to set up WebGL2 is logged and
    /// yields an inactive cursor instead of an exception.
    #[must_use]
    pub fn mount(canvas: HtmlCanvasElement, options: &SplashOptions) -> SplashCursor {
        match Mounted::new(canvas, options.config.clone()) {
            Ok(mounted) => SplashCursor {
                mounted: Some(mounted),
            },
            Err(err) => {
                log::error!("splash cursor disabled: {err:#}");
                SplashCursor { mounted: None }
            }
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.mounted.is_some()
    }

    /// Stops the frame loop, detaches listeners and frees GPU resources.
    /// Safe to call more than once.
    pub fn destroy(&mut self) {
        if let Some(mounted) = self.mounted.take() {
            mounted.teardown();
        }
    }
}

impl Drop for SplashCursor {
    fn drop(&mut self) {
        self.destroy();
    }
}

struct Mounted {
    canvas: HtmlCanvasElement,
    simulation: SharedSimulation,
    listeners: Vec<(&'static str, Closure<dyn FnMut(PointerEvent)>)>,
    frame: Rc<RefCell<Option<FrameCallback>>>,
    frame_handle: Rc<Cell<Option<i32>>>,
}

impl Mounted {
    fn new(canvas: HtmlCanvasElement, config: SimulationConfig) -> Result<Self> {
        let backend = WebGlBackend::new(&canvas)?;
        let simulation = Rc::new(RefCell::new(Simulation::new(backend, config)?));

        let handlers: [(&'static str, fn(&mut PointerInput, i32, Vec2)); 4] = [
            ("pointerdown", |input, id, position| input.pointer_down(id, position)),
            ("pointermove", |input, id, position| input.pointer_move(id, position)),
            ("pointerup", |input, id, _| input.pointer_up(id)),
            ("pointerleave", |input, id, _| input.pointer_leave(id)),
        ];
        let mut mounted = Self {
            canvas,
            simulation,
            listeners: Vec::with_capacity(handlers.len()),
            frame: Rc::new(RefCell::new(None)),
            frame_handle: Rc::new(Cell::new(None)),
        };
        for (event, handler) in handlers {
            let listener = pointer_listener(&mounted.simulation, handler);
            let attached = mounted
                .canvas
                .add_event_listener_with_callback(event, listener.as_ref().unchecked_ref());
            if let Err(err) = attached {
                mounted.teardown();
                return Err(js_error(err)).with_context(|| format!("attaching {event} listener"));
            }
            mounted.listeners.push((event, listener));
        }

        if let Err(err) = mounted.start() {
            mounted.teardown();
            return Err(err);
        }
        log::info!("splash cursor mounted");
        Ok(mounted)
    }

    fn start(&self) -> Result<()> {
        let simulation = Rc::clone(&self.simulation);
        let frame = Rc::clone(&self.frame);
        let handle = Rc::clone(&self.frame_handle);
        let callback = Closure::<dyn FnMut(f64)>::new(move |now: f64| {
            handle.set(None);
            if let Ok(mut simulation) = simulation.try_borrow_mut() {
                simulation.frame(now);
            }
            if let Some(callback) = frame.borrow().as_ref() {
                match request_frame(callback) {
                    Ok(id) => handle.set(Some(id)),
                    Err(err) => log::error!("frame loop stopped: {err:#}"),
                }
            }
        });
        let id = request_frame(&callback)?;
        self.frame_handle.set(Some(id));
        *self.frame.borrow_mut() = Some(callback);
        Ok(())
    }

    fn teardown(self) {
        if let Some(id) = self.frame_handle.take() {
            if let Some(window) = web_sys::window() {
                let _ = window.cancel_animation_frame(id);
            }
        }
        // the callback holds clones of `frame` and `simulation`
        self.frame.borrow_mut().take();
        for (event, listener) in &self.listeners {
            let _ = self
                .canvas
                .remove_event_listener_with_callback(event, listener.as_ref().unchecked_ref());
        }
        drop(self.listeners);
        // last reference, releases fields and programs
        drop(self.simulation);
        log::info!("splash cursor destroyed");
    }
}

fn request_frame(callback: &FrameCallback) -> Result<i32> {
    web_sys::window()
        .context("no window")?
        .request_animation_frame(callback.as_ref().unchecked_ref())
        .map_err(js_error)
}

/// Canvas-relative event position in device pixels.
fn device_position(event: &PointerEvent) -> Vec2 {
    let ratio = web_sys::window().map_or(1.0, |w| w.device_pixel_ratio()) as f32;
    vec2(event.offset_x() as f32, event.offset_y() as f32) * ratio
}

fn pointer_listener(
    simulation: &SharedSimulation,
    handler: fn(&mut PointerInput, i32, Vec2),
) -> Closure<dyn FnMut(PointerEvent)> {
    let simulation = Rc::clone(simulation);
    Closure::new(move |event: PointerEvent| {
        if let Ok(mut simulation) = simulation.try_borrow_mut() {
            handler(simulation.input_mut(), event.pointer_id(), device_position(&event));
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_reads_whole_triples() {
        let colors = palette(&[1.0, 0.0, 0.0, 0.0, 0.5, 1.0, 0.2]);
        assert_eq!(colors, vec![vec3(1.0, 0.0, 0.0), vec3(0.0, 0.5, 1.0)]);
    }

    #[test]
    fn options_start_from_defaults() {
        let mut options = SplashOptions::new();
        assert_eq!(options.config, SimulationConfig::default());
        options.set_curl(0.0);
        options.set_single_color(0.0, 1.0, 0.0);
        options.set_max_dt(1.0 / 30.0);
        assert_eq!(options.config.curl, 0.0);
        assert_eq!(options.config.max_dt, 1.0 / 30.0);
        assert_eq!(options.config.color_mode, ColorMode::Single(vec3(0.0, 1.0, 0.0)));
    }
}
