//! Viewer window, GPU objects and the event loop

use ash::vk;
use glfw::{Action, Key, WindowEvent};
use render_engine::render::deferred::{DeferredPipelines, DeferredRenderer, PresentTarget};
use render_engine::render::pacing::{FramePacer, PacerStep};
use render_engine::render::submit::{FrameSynchronizer, SubmissionInfo, WaitSemaphore};
use render_engine::render::vulkan::{
    CommandPool, CommandRecorder, GpuDevice, MemoryAllocator, Semaphore, Swapchain, VmaAllocator, VulkanContext,
    Window,
};
use render_engine::scene::{CameraUniform, Scene};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::camera_controller::CameraController;
use crate::config::ViewerConfig;
use crate::error::ViewerResult;
use crate::loader::SceneSource;
use crate::overlay::PerformanceOverlay;

/// glTF viewer application
///
/// Fields drop in declaration order. Everything recorded into the frame command buffer goes
/// before the pool, and the context goes last.
pub struct App {
    pacer: FramePacer<VulkanContext>,
    renderer: DeferredRenderer<VulkanContext>,
    scene: Scene,
    camera: Arc<CameraUniform>,
    image_available: Semaphore,
    render_finished: Semaphore,
    swapchain: Swapchain,
    _pipelines: DeferredPipelines,
    _command_pool: CommandPool,
    _allocator: Arc<dyn MemoryAllocator>,
    context: Arc<VulkanContext>,
    window: Window,
    controller: CameraController,
    overlay: PerformanceOverlay,
    config: ViewerConfig,
    swapchain_stale: bool,
    last_update: Instant,
}

impl App {
    /// Open the window, bring up Vulkan and upload the scene at `scene_path`
    pub fn new(scene_path: &Path, config: ViewerConfig) -> ViewerResult<Self> {
        let source = SceneSource::load(scene_path)?;
        log::info!(
            "Loaded {} ({} meshes, {} materials, {} textures)",
            scene_path.display(),
            source.meshes.len(),
            source.materials.len(),
            source.textures.len()
        );

        let window = Window::new(&config.window.title, config.window.width, config.window.height)?;
        let context = Arc::new(VulkanContext::new(&window, &config.renderer)?);
        log::info!("Using {}", context.device_name());

        let allocator: Arc<dyn MemoryAllocator> = Arc::new(VmaAllocator::new(Arc::clone(&context))?);
        let command_pool = CommandPool::new(context.device().clone(), context.queue_family())?;
        let pipelines = DeferredPipelines::new(context.device(), &config.renderer)?;
        let swapchain = Swapchain::new(Arc::clone(&context), window.framebuffer_size())?;

        let controller = CameraController::new(&config.camera, swapchain.extent());
        let (scene, camera) = source.upload(
            &context,
            &allocator,
            &pipelines.handles(),
            command_pool.handle(),
            &controller.camera_data(),
        )?;

        let renderer = DeferredRenderer::new(
            Arc::clone(&context),
            Arc::clone(&allocator),
            pipelines.handles(),
            swapchain.extent(),
        )?;

        let image_available = Semaphore::new(context.device().clone())?;
        let render_finished = Semaphore::new(context.device().clone())?;
        let initial = SubmissionInfo {
            // The first barrier on the acquired image is sourced from TOP_OF_PIPE
            wait: Some(WaitSemaphore {
                semaphore: image_available.handle(),
                stage: vk::PipelineStageFlags::ALL_COMMANDS,
            }),
            signal: Some(render_finished.handle()),
            command_buffer: context.allocate_command_buffer(command_pool.handle())?,
        };
        let pacer = FramePacer::new(FrameSynchronizer::new(Arc::clone(&context))?, initial);

        Ok(Self {
            pacer,
            renderer,
            scene,
            camera,
            image_available,
            render_finished,
            swapchain,
            _pipelines: pipelines,
            _command_pool: command_pool,
            _allocator: allocator,
            context,
            window,
            controller,
            overlay: PerformanceOverlay::new(),
            config,
            swapchain_stale: false,
            last_update: Instant::now(),
        })
    }

    /// Run until the window closes, then wait for the GPU to finish
    pub fn run(&mut self) -> ViewerResult<()> {
        log::info!("Entering event loop");
        while !self.window.should_close() {
            self.window.poll_events();
            self.handle_events();

            let framebuffer = self.window.framebuffer_size();
            if framebuffer.width == 0 || framebuffer.height == 0 {
                self.window.wait_events();
                continue;
            }
            if self.swapchain_stale {
                self.recreate_swapchain(framebuffer)?;
            }

            let now = Instant::now();
            self.controller.update((now - self.last_update).as_secs_f32());
            self.last_update = now;

            match self.poll_frame()? {
                PacerStep::Submitted(index) => {
                    if !self.swapchain.present(index, self.render_finished.handle())? {
                        self.swapchain_stale = true;
                    }
                }
                PacerStep::Skipped => self.swapchain_stale = true,
                PacerStep::Pending => {}
            }
        }

        self.pacer.drain()?;
        self.context.wait_idle()?;
        log::info!("Event loop finished");
        Ok(())
    }

    fn handle_events(&mut self) {
        let events: Vec<_> = self.window.flush_events().collect();
        for event in events {
            match event {
                WindowEvent::Key(Key::Escape, _, Action::Press, _) | WindowEvent::Close => {
                    self.window.set_should_close(true);
                }
                WindowEvent::FramebufferSize(..) => self.swapchain_stale = true,
                _ => {}
            }
            self.controller.handle_event(&event);
        }
    }

    fn recreate_swapchain(&mut self, framebuffer: vk::Extent2D) -> ViewerResult<()> {
        self.pacer.drain()?;
        self.swapchain.recreate(framebuffer)?;
        self.renderer.invalidate_output();
        self.controller.on_resize(self.swapchain.extent());
        self.swapchain_stale = false;
        Ok(())
    }

    /// Record and submit the next frame once the previous one is off the GPU
    ///
    /// Yields the acquired image index when a frame was submitted.
    fn poll_frame(&mut self) -> ViewerResult<PacerStep<u32>> {
        let Self {
            pacer,
            renderer,
            scene,
            camera,
            image_available,
            swapchain,
            context,
            controller,
            overlay,
            config,
            ..
        } = self;

        let step = pacer.poll(config.renderer.frame_poll_timeout(), |info| {
            let Some(index) = swapchain.acquire(image_available.handle())? else {
                return Ok(None);
            };
            camera.set(&controller.camera_data())?;

            let target = PresentTarget {
                image: swapchain.image(index),
                view: swapchain.image_view(index),
                extent: swapchain.extent(),
            };
            let mut recorder = context.recorder(info.command_buffer);
            recorder.reset()?;
            recorder.begin()?;
            renderer.record_frame(&mut recorder, scene, &target, overlay)?;
            recorder.end()?;
            Ok(Some(index))
        })?;
        Ok(step)
    }
}
