use std::{env, net::SocketAddr, path::PathBuf, str::FromStr};

use crate::engine::models::ExecutionLimits;

#[derive(Debug, Clone)]
pub struct JudgeConfig {
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub limits: ExecutionLimits,
    pub bounds: RequestBounds,
    pub workspace_root: PathBuf,
    pub max_concurrent_judges: usize,
    pub toolchains: ToolchainConfig,
}

/// Structural limits checked before a workspace is created.
#[derive(Debug, Clone, Copy)]
pub struct RequestBounds {
    pub max_source_bytes: usize,
    pub max_test_cases: usize,
    /// Per test case, applied to `input` and `expected_output` separately.
    pub max_case_bytes: usize,
}

impl Default for RequestBounds {
    fn default() -> Self {
        Self {
            max_source_bytes: 256_000,
            max_test_cases: 256,
            max_case_bytes: 64 * 1024,
        }
    }
}

// Room for keys, ids and flags around the payload strings.
const BODY_ENVELOPE_BYTES: usize = 64 * 1024;

impl RequestBounds {
    /// Largest request body that can still hold a valid submission.
    ///
    /// String lengths are doubled to leave room for JSON escaping.
    pub fn body_limit(&self) -> usize {
        let cases = self
            .max_test_cases
            .saturating_mul(self.max_case_bytes.saturating_mul(2))
            .saturating_mul(2);
        self.max_source_bytes
            .saturating_mul(2)
            .saturating_add(cases)
            .saturating_add(BODY_ENVELOPE_BYTES)
    }
}

#[derive(Debug, Clone)]
pub struct ToolchainConfig {
    pub python: String,
    pub node: String,
    pub gcc: String,
    pub gxx: String,
    pub rustc: String,
    pub javac: String,
    pub java: String,
    pub java_heap_mb: u64,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            python: "python3".to_string(),
            node: "node".to_string(),
            gcc: "gcc".to_string(),
            gxx: "g++".to_string(),
            rustc: "rustc".to_string(),
            javac: "javac".to_string(),
            java: "java".to_string(),
            java_heap_mb: 256,
        }
    }
}

impl JudgeConfig {
    pub fn from_env() -> Self {
        let defaults = ExecutionLimits::default();
        let toolchain_defaults = ToolchainConfig::default();
        let bound_defaults = RequestBounds::default();
        Self {
            bind_addr: env_parse("BIND_ADDR", SocketAddr::from(([0, 0, 0, 0], 5000))),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            limits: ExecutionLimits {
                run_timeout_ms: env_parse("RUN_TIMEOUT_MS", defaults.run_timeout_ms),
                compile_timeout_ms: env_parse("COMPILE_TIMEOUT_MS", defaults.compile_timeout_ms),
                max_output_chars: env_parse("MAX_OUTPUT_CHARS", defaults.max_output_chars),
                max_diagnostic_chars: env_parse(
                    "MAX_DIAGNOSTIC_CHARS",
                    defaults.max_diagnostic_chars,
                ),
            }
            .normalized(),
            bounds: RequestBounds {
                max_source_bytes: env_parse("MAX_SOURCE_BYTES", bound_defaults.max_source_bytes),
                max_test_cases: env_parse("MAX_TEST_CASES", bound_defaults.max_test_cases),
                max_case_bytes: env_parse("MAX_CASE_BYTES", bound_defaults.max_case_bytes),
            },
            workspace_root: env::var("WORKSPACE_ROOT")
                .ok()
                .filter(|raw| !raw.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(env::temp_dir),
            max_concurrent_judges: env_parse("MAX_CONCURRENT_JUDGES", 4usize).max(1),
            toolchains: ToolchainConfig {
                python: env_string("PYTHON_BIN", toolchain_defaults.python),
                node: env_string("NODE_BIN", toolchain_defaults.node),
                gcc: env_string("GCC_BIN", toolchain_defaults.gcc),
                gxx: env_string("GXX_BIN", toolchain_defaults.gxx),
                rustc: env_string("RUSTC_BIN", toolchain_defaults.rustc),
                javac: env_string("JAVAC_BIN", toolchain_defaults.javac),
                java: env_string("JAVA_BIN", toolchain_defaults.java),
                java_heap_mb: env_parse("JAVA_HEAP_MB", toolchain_defaults.java_heap_mb)
                    .clamp(16, 8192),
            },
        }
    }
}

fn env_string(key: &str, default: String) -> String {
    env::var(key)
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
        .unwrap_or(default)
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_on_garbage() {
        // Unique key so parallel tests never race on it.
        let key = "JUDGE_TEST_ENV_PARSE_GARBAGE";
        unsafe { env::set_var(key, "not-a-number") };
        assert_eq!(env_parse(key, 42u64), 42);
        unsafe { env::set_var(key, " 17 ") };
        assert_eq!(env_parse(key, 42u64), 17);
        unsafe { env::remove_var(key) };
    }

    #[test]
    fn env_string_ignores_blank_values() {
        let key = "JUDGE_TEST_ENV_STRING_BLANK";
        unsafe { env::set_var(key, "   ") };
        assert_eq!(env_string(key, "python3".to_string()), "python3");
        unsafe { env::remove_var(key) };
    }

    #[test]
    fn body_limit_covers_a_maximal_submission() {
        let bounds = RequestBounds::default();
        let payload = bounds.max_source_bytes + bounds.max_test_cases * bounds.max_case_bytes * 2;
        assert!(bounds.body_limit() > payload);
        // Default bounds admit more than axum's 2 MB fallback.
        assert!(bounds.body_limit() > 2 * 1024 * 1024);
    }

    #[test]
    fn toolchain_defaults_use_plain_binary_names() {
        let toolchains = ToolchainConfig::default();
        assert_eq!(toolchains.gxx, "g++");
        assert_eq!(toolchains.java_heap_mb, 256);
    }
}
