//! vkframe demo.
//!
//! Opens a window and draws a rotating indexed quad through the renderer
//! delegate. Settings come from `vkframe.toml` in the working directory when
//! present.

mod quad;

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vkframe_core::{DEFAULT_LOG_FILTER, EngineConfig, init_logging_with};
use vkframe_platform::Window;
use vkframe_renderer::Renderer;

use crate::quad::{QuadDelegate, default_shader_dir};

const CONFIG_PATH: &str = "vkframe.toml";

struct App {
    config: EngineConfig,
    // Dropped before the window it presents to.
    renderer: Option<Renderer>,
    window: Option<Window>,
}

impl App {
    fn new(config: EngineConfig) -> Self {
        Self {
            config,
            renderer: None,
            window: None,
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::from_config(event_loop, &self.config.window)?;
        let delegate = Box::new(QuadDelegate::new(default_shader_dir()));
        let renderer = Renderer::new(&window, &self.config, delegate)?;

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        match self.init(event_loop) {
            Ok(()) => info!("Initialization complete, entering main loop"),
            Err(e) => {
                error!("Failed to initialize: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.renderer = None;
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                if let Some(renderer) = self.renderer.as_mut()
                    && let Err(e) = renderer.render_frame()
                {
                    error!("Fatal render error: {}", e);
                    self.renderer = None;
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    // Logging depends on the config, so config problems are reported afterwards.
    let (config, config_error) = EngineConfig::load_or_default(CONFIG_PATH);
    init_logging_with(config.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER));
    if let Some(e) = config_error {
        tracing::warn!("{}; using default configuration", e);
    }

    info!("Starting {}", config.app_name);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
