//! 脚本资源模块
//!
//! 按配置加载资源目录并在脚本引擎中启动。

pub mod resource;

pub use crate::config::Side;
pub use resource::{ResourceManifest, ScriptEntry, ScriptKind, ScriptResource, MANIFEST_FILE};

use crate::bindings::protocol::BindingAdapter;
use crate::config::ScriptingConfig;
use crate::core::error::ScriptResult;

/// 按配置顺序加载并启动 `resources` 中列出的资源，遇到第一个失败即停止
pub fn start_resources(
    config: &ScriptingConfig,
    adapter: &mut dyn BindingAdapter,
) -> ScriptResult<Vec<ScriptResource>> {
    let mut started = Vec::with_capacity(config.resources.len());
    for name in &config.resources {
        let resource = ScriptResource::load(config.resource_root.join(name))?;
        resource.start(adapter, config.side)?;
        started.push(resource);
    }
    Ok(started)
}
