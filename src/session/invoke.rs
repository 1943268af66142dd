//! Builds the external interpreter invocation for one run.
//!
//! The script is not launched directly; a small bootstrap runs inside
//! `pwsh` so the three output channels survive the trip over two pipes:
//! progress records become marker-prefixed stdout lines, error records
//! become one compact JSON object per stderr line, and everything else
//! passes through stdout unchanged.

use std::path::Path;

use crate::config::Config;

/// Marker prefixing progress samples on the stdout wire. Stripped by the
/// session's reader before lines reach the demultiplexer.
pub const PROGRESS_MARKER: &str = "@@progress@@";

/// One fully-specified external process launch.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

/// The `pwsh` invocation for `script`, attaching every argument definition
/// as a named parameter (committed value or empty).
pub fn pwsh_invocation(cfg: &Config, script: &Path, params: &[(String, String)]) -> Invocation {
    Invocation::new(
        cfg.pwsh_bin(),
        vec![
            "-NoProfile".into(),
            "-NonInteractive".into(),
            "-Command".into(),
            build_bootstrap(script, params),
        ],
    )
}

fn build_bootstrap(script: &Path, params: &[(String, String)]) -> String {
    let mut call = format!("& {}", quote(&script.to_string_lossy()));
    for (key, value) in params {
        call.push_str(&format!(" -{key} {}", quote(value)));
    }

    format!(
        r#"$ErrorActionPreference = 'Continue'
function Write-Progress {{ param([string]$Activity, [string]$Status, [int]$PercentComplete) [Console]::Out.WriteLine('{marker}' + $PercentComplete + '|' + $Status) }}
{call} 2>&1 | ForEach-Object {{
  if ($_ -is [System.Management.Automation.ErrorRecord]) {{
    $f = @{{}}
    if ($null -ne $_.TargetObject) {{ $f.target_object = $_.TargetObject.ToString() }}
    if ($null -ne $_.CategoryInfo) {{ $f.category_info = $_.CategoryInfo.ToString() }}
    if ($_.ScriptStackTrace) {{ $f.stack_trace = $_.ScriptStackTrace }}
    if ($_.FullyQualifiedErrorId) {{ $f.fully_qualified_id = $_.FullyQualifiedErrorId }}
    if ($null -ne $_.ErrorDetails) {{ $f.details = $_.ErrorDetails.ToString() }}
    if ($null -ne $_.Exception) {{ $f.exception = $_.Exception.Message }}
    if ($null -ne $_.InvocationInfo) {{ $f.invocation_info = $_.InvocationInfo.PositionMessage }}
    if ($_.PipelineIterationInfo) {{ $f.pipeline_iteration_info = ($_.PipelineIterationInfo -join ',') }}
    [Console]::Error.WriteLine((ConvertTo-Json $f -Compress))
  }} else {{
    [Console]::Out.WriteLine($_.ToString())
  }}
}}"#,
        marker = PROGRESS_MARKER,
        call = call,
    )
}

/// PowerShell single-quoted literal; embedded quotes are doubled.
fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invocation_uses_configured_interpreter() {
        let mut cfg = Config::load();
        cfg.set("PWSH_BIN", "/opt/pwsh/pwsh");
        let inv = pwsh_invocation(&cfg, Path::new("/lib/acct/new-user.ps1"), &[]);

        assert_eq!(inv.program, "/opt/pwsh/pwsh");
        assert_eq!(inv.args[0], "-NoProfile");
        assert_eq!(inv.args[2], "-Command");
        assert!(inv.args[3].contains("& '/lib/acct/new-user.ps1'"));
    }

    #[test]
    fn every_parameter_is_attached_by_name() {
        let cfg = Config::load();
        let params = vec![
            ("Username".to_string(), "alice".to_string()),
            ("Notify".to_string(), String::new()),
        ];
        let inv = pwsh_invocation(&cfg, Path::new("s.ps1"), &params);
        let bootstrap = &inv.args[3];

        assert!(bootstrap.contains("-Username 'alice'"));
        assert!(bootstrap.contains("-Notify ''"));
    }

    #[test]
    fn values_are_single_quote_escaped() {
        let cfg = Config::load();
        let params = vec![("Name".to_string(), "O'Brien".to_string())];
        let inv = pwsh_invocation(&cfg, Path::new("s.ps1"), &params);
        assert!(inv.args[3].contains("-Name 'O''Brien'"));
    }

    #[test]
    fn bootstrap_rewires_progress_and_errors() {
        let cfg = Config::load();
        let inv = pwsh_invocation(&cfg, Path::new("s.ps1"), &[]);
        let bootstrap = &inv.args[3];

        assert!(bootstrap.contains("function Write-Progress"));
        assert!(bootstrap.contains(PROGRESS_MARKER));
        assert!(bootstrap.contains("ConvertTo-Json"));
    }
}
