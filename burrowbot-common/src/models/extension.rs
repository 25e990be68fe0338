use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use url::Url;

/// What the index knows about an installable extension. Immutable once
/// resolved; identity is the lowercase, whitespace-free name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExtensionDescriptor {
    pub name: String,
    #[serde(default)]
    pub source_repository: Option<Url>,
    #[serde(default)]
    pub package_deps: BTreeSet<String>,
    #[serde(default)]
    pub extension_deps: BTreeSet<String>,
}

/// A currently installed extension. `loaded` flips to true once the
/// extension's module has been loaded into the running process.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstalledExtension {
    pub name: String,
    pub loaded: bool,
}

/// The unmet requirements of a single install/update attempt: packages and
/// extensions that are declared but not currently satisfied. An empty
/// closure means the operation completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyClosure {
    pub packages: Vec<String>,
    pub extensions: Vec<String>,
}

impl DependencyClosure {
    pub fn is_satisfied(&self) -> bool {
        self.packages.is_empty() && self.extensions.is_empty()
    }
}

/// Which batch operation a report describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Install,
    Update,
    Uninstall,
}

impl BatchKind {
    fn completed_heading(self) -> &'static str {
        match self {
            BatchKind::Install => "Installation completed.",
            BatchKind::Update => "Update completed.",
            BatchKind::Uninstall => "Uninstallation completed.",
        }
    }

    fn succeeded_heading(self) -> &'static str {
        match self {
            BatchKind::Install => "Installed extensions:",
            BatchKind::Update => "Updated extensions:",
            BatchKind::Uninstall => "Uninstalled extensions:",
        }
    }

    fn failed_heading(self) -> &'static str {
        match self {
            BatchKind::Install => "Failed to install extensions:",
            BatchKind::Update => "Failed to update extensions:",
            BatchKind::Uninstall => "Failed to uninstall extensions:",
        }
    }
}

/// Accumulated outcome of one batch command. Every extension the user
/// asked for ends up in exactly one of `succeeded`/`failed`; packages
/// installed along the way are tracked separately.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub kind: BatchKind,
    pub succeeded: Vec<String>,
    pub failed: Vec<String>,
    pub installed_packages: Vec<String>,
    pub failed_packages: Vec<String>,
}

impl BatchReport {
    pub fn new(kind: BatchKind) -> Self {
        Self {
            kind,
            succeeded: Vec::new(),
            failed: Vec::new(),
            installed_packages: Vec::new(),
            failed_packages: Vec::new(),
        }
    }

    pub fn any_succeeded(&self) -> bool {
        !self.succeeded.is_empty()
    }

    /// The single aggregated completion message sent after a batch.
    pub fn render(&self) -> String {
        let mut out = String::from(self.kind.completed_heading());
        out.push('\n');
        if !self.succeeded.is_empty() {
            out.push_str(self.kind.succeeded_heading());
            out.push('\n');
            out.push_str(&bold_list(&self.succeeded));
        }
        if !self.installed_packages.is_empty() {
            out.push_str("Installed packages:\n");
            out.push_str(&bold_list(&self.installed_packages));
        }
        if !self.failed.is_empty() {
            out.push_str(self.kind.failed_heading());
            out.push('\n');
            out.push_str(&bold_list(&self.failed));
        }
        if !self.failed_packages.is_empty() {
            out.push_str("Failed to install packages:\n");
            out.push_str(&bold_list(&self.failed_packages));
        }
        out
    }
}

fn bold_list(names: &[String]) -> String {
    let mut out = String::new();
    for name in names {
        out.push_str("**");
        out.push_str(name);
        out.push_str("**\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_closure_is_satisfied() {
        assert!(DependencyClosure::default().is_satisfied());
        let closure = DependencyClosure {
            packages: vec!["requests-lib".to_string()],
            extensions: vec![],
        };
        assert!(!closure.is_satisfied());
    }

    #[test]
    fn report_renders_all_sections() {
        let mut report = BatchReport::new(BatchKind::Install);
        report.succeeded.push("weather".to_string());
        report.installed_packages.push("requests-lib".to_string());
        report.failed.push("music".to_string());
        report.failed_packages.push("ffmpeg-lib".to_string());

        let rendered = report.render();
        assert!(rendered.starts_with("Installation completed."));
        assert!(rendered.contains("Installed extensions:\n**weather**"));
        assert!(rendered.contains("Installed packages:\n**requests-lib**"));
        assert!(rendered.contains("Failed to install extensions:\n**music**"));
        assert!(rendered.contains("Failed to install packages:\n**ffmpeg-lib**"));
    }

    #[test]
    fn report_omits_empty_sections() {
        let mut report = BatchReport::new(BatchKind::Uninstall);
        report.succeeded.push("weather".to_string());

        let rendered = report.render();
        assert!(rendered.contains("Uninstalled extensions:"));
        assert!(!rendered.contains("Failed"));
        assert!(!rendered.contains("packages"));
    }
}
