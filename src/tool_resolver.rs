//! # Tool Path Resolver
//!
//! Finds the external binaries a run depends on:
//! - an operator supplied tools directory (`Config::tools_dir`), searched first
//! - the system `PATH`

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Binaries the converter shells out to
pub const REQUIRED_TOOLS: [&str; 3] = ["cwebp", "exiftool", "webpmux"];

/// Tool path resolver for the conversion binaries
#[derive(Debug, Clone, Default)]
pub struct ToolPathResolver {
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    /// Create a resolver; `tools_dir` is searched before PATH
    pub fn new(tools_dir: Option<PathBuf>) -> Self {
        Self { tools_dir }
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        if let Some(ref tools_dir) = self.tools_dir {
            let candidate = tools_dir.join(Self::executable_name(tool_name));
            if candidate.is_file() {
                debug!("Using tool from tools dir: {} -> {:?}", tool_name, candidate);
                return Some(candidate);
            }
        }

        if let Some(system_path) = self.find_in_system_path(tool_name) {
            debug!("Using system tool: {} -> {:?}", tool_name, system_path);
            return Some(system_path);
        }

        warn!("Tool not found: {}", tool_name);
        None
    }

    fn executable_name(tool_name: &str) -> String {
        let extension = if cfg!(windows) { ".exe" } else { "" };
        format!("{}{}", tool_name, extension)
    }

    /// Find tool in system PATH
    fn find_in_system_path(&self, tool_name: &str) -> Option<PathBuf> {
        let tool_with_ext = Self::executable_name(tool_name);
        let path_var = env::var_os("PATH")?;

        env::split_paths(&path_var)
            .map(|dir| dir.join(&tool_with_ext))
            .find(|path| path.is_file())
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        self.resolve_tool(tool_name).is_some()
    }

    /// Get installation instructions for a tool on Linux
    fn get_linux_install_instructions(tool_name: &str) -> String {
        match tool_name {
            "cwebp" | "webpmux" | "dwebp" => "sudo apt-get install webp".to_string(),
            "exiftool" => "sudo apt-get install libimage-exiftool-perl".to_string(),
            _ => format!("sudo apt-get install {}", tool_name),
        }
    }

    /// Check if a tool is available and provide installation instructions if not
    pub fn check_tool_with_instructions(&self, tool_name: &str) -> Result<PathBuf, String> {
        if let Some(path) = self.resolve_tool(tool_name) {
            return Ok(path);
        }

        if cfg!(target_os = "linux") {
            Err(format!(
                "Tool '{}' not found in system PATH.\n\
                To install on Linux, run:\n  {}",
                tool_name,
                Self::get_linux_install_instructions(tool_name)
            ))
        } else {
            Err(format!(
                "Tool '{}' not found. Please ensure it's installed or placed in the tools directory.",
                tool_name
            ))
        }
    }

    /// Names of the required tools that cannot be resolved
    pub fn missing_tools(&self) -> Vec<&'static str> {
        REQUIRED_TOOLS
            .iter()
            .copied()
            .filter(|tool| !self.is_tool_available(tool))
            .collect()
    }

    pub fn tools_dir(&self) -> Option<&Path> {
        self.tools_dir.as_deref()
    }
}
