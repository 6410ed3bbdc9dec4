use std::sync::Arc;

use crate::config::Config;
use crate::forge::{ForgeApi, GithubApi};
use crate::modules::{SystemWest, WestRunner};
use crate::parser::{KeymapParser, PythonKeymapParser};
use crate::pipeline::Pipeline;
use crate::raster::{Rasterizer, RsvgRasterizer};
use crate::render::{KeymapRenderer, PythonKeymapRenderer};
use crate::snapshot::{global_snapshot_cache, SnapshotCache};

/// Every external collaborator the pipeline and its helpers talk to.
pub trait Effects: Send + Sync {
    fn forge(&self) -> &dyn ForgeApi;
    fn snapshots(&self) -> &SnapshotCache;
    fn west(&self) -> &dyn WestRunner;
    fn parser(&self) -> &dyn KeymapParser;
    fn renderer(&self) -> &dyn KeymapRenderer;
    fn rasterizer(&self) -> &dyn Rasterizer;
    /// Host keymap URLs must point at.
    fn web_host(&self) -> &str;

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline::new(
            self.web_host(),
            self.forge(),
            self.snapshots(),
            self.west(),
            self.parser(),
        )
    }
}

/// Real network, process-wide snapshot cache and locally installed tools.
pub struct SystemEffects {
    web_host: String,
    forge: Arc<GithubApi>,
    snapshots: &'static SnapshotCache,
    west: Arc<SystemWest>,
    parser: Arc<PythonKeymapParser>,
    renderer: Arc<PythonKeymapRenderer>,
    rasterizer: Arc<RsvgRasterizer>,
}

impl SystemEffects {
    /// # Errors
    ///
    /// Fails when the HTTP client cannot be built.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let tools = config.tools();
        Ok(Self {
            web_host: config.forge().web_host.clone(),
            forge: Arc::new(GithubApi::new(config.forge())?),
            snapshots: global_snapshot_cache(config.cache()),
            west: Arc::new(SystemWest::new(tools.west.clone())),
            parser: Arc::new(
                PythonKeymapParser::new(tools.python.clone()).with_timeout(tools.parse_timeout),
            ),
            renderer: Arc::new(
                PythonKeymapRenderer::new(tools.python.clone()).with_timeout(tools.draw_timeout),
            ),
            rasterizer: Arc::new(RsvgRasterizer::new(tools.rasterizer.clone())),
        })
    }
}

impl Effects for SystemEffects {
    fn forge(&self) -> &dyn ForgeApi {
        self.forge.as_ref()
    }

    fn snapshots(&self) -> &SnapshotCache {
        self.snapshots
    }

    fn west(&self) -> &dyn WestRunner {
        self.west.as_ref()
    }

    fn parser(&self) -> &dyn KeymapParser {
        self.parser.as_ref()
    }

    fn renderer(&self) -> &dyn KeymapRenderer {
        self.renderer.as_ref()
    }

    fn rasterizer(&self) -> &dyn Rasterizer {
        self.rasterizer.as_ref()
    }

    fn web_host(&self) -> &str {
        &self.web_host
    }
}
