//! 脚本资源
//!
//! 一个资源是一个目录，内含 `resource.toml` 清单和若干脚本文件：
//!
//! ```toml
//! name = "freeroam"
//!
//! [[script]]
//! file = "shared/util.js"
//! kind = "shared"
//!
//! [[script]]
//! file = "server/main.js"
//! kind = "server"
//! ```
//!
//! 启动时按清单顺序执行所有在当前端运行的脚本（`shared` 两端都运行），
//! 遇到第一个失败即停止。

use crate::bindings::protocol::BindingAdapter;
use crate::config::Side;
use crate::core::error::{ScriptError, ScriptResult};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// 清单文件名
pub const MANIFEST_FILE: &str = "resource.toml";

/// 脚本运行在哪一端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptKind {
    Server,
    Client,
    Shared,
}

impl ScriptKind {
    pub fn runs_on(self, side: Side) -> bool {
        match self {
            ScriptKind::Shared => true,
            ScriptKind::Server => side == Side::Server,
            ScriptKind::Client => side == Side::Client,
        }
    }
}

/// 清单中的一个脚本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptEntry {
    /// 相对资源目录的路径
    pub file: PathBuf,
    pub kind: ScriptKind,
}

/// `resource.toml` 的内容
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceManifest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, rename = "script")]
    pub scripts: Vec<ScriptEntry>,
}

impl ResourceManifest {
    pub fn from_toml_str(content: &str) -> ScriptResult<Self> {
        let manifest: Self =
            toml::from_str(content).map_err(|e| ScriptError::Manifest(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&self) -> ScriptResult<()> {
        if self.name.trim().is_empty() {
            return Err(ScriptError::Manifest("resource name is empty".to_string()));
        }
        for entry in &self.scripts {
            let escapes = entry
                .file
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
            if escapes || entry.file.as_os_str().is_empty() {
                return Err(ScriptError::Manifest(format!(
                    "script path '{}' must stay inside the resource",
                    entry.file.display()
                )));
            }
        }
        Ok(())
    }
}

/// 已加载清单的资源
#[derive(Debug, Clone)]
pub struct ScriptResource {
    root: PathBuf,
    manifest: ResourceManifest,
}

impl ScriptResource {
    /// 读取 `dir/resource.toml`
    pub fn load(dir: impl AsRef<Path>) -> ScriptResult<Self> {
        let root = dir.as_ref().to_path_buf();
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(ScriptError::NotFound(manifest_path.display().to_string()));
        }
        let content = fs::read_to_string(&manifest_path)?;
        let manifest = ResourceManifest::from_toml_str(&content)?;
        Ok(Self { root, manifest })
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &ResourceManifest {
        &self.manifest
    }

    /// 当前端要执行的脚本，按清单顺序
    pub fn scripts_for(&self, side: Side) -> impl Iterator<Item = &ScriptEntry> {
        self.manifest
            .scripts
            .iter()
            .filter(move |entry| entry.kind.runs_on(side))
    }

    /// 执行当前端的全部脚本，返回执行的脚本数
    pub fn start(&self, adapter: &mut dyn BindingAdapter, side: Side) -> ScriptResult<usize> {
        let mut executed = 0;
        for entry in self.scripts_for(side) {
            let path = self.root.join(&entry.file);
            if !path.is_file() {
                return Err(ScriptError::NotFound(path.display().to_string()));
            }
            let source = fs::read_to_string(&path)?;
            let label = format!("{}/{}", self.manifest.name, entry.file.display());
            adapter.execute(&label, &source).map_err(|error| {
                tracing::error!(target: "script", resource = %self.manifest.name, script = %label, %error, "script failed");
                error
            })?;
            executed += 1;
        }
        tracing::info!(
            target: "script",
            resource = %self.manifest.name,
            %side,
            scripts = executed,
            "resource started"
        );
        Ok(executed)
    }
}
