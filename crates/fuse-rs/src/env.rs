use std::env;
use std::sync::OnceLock;

static FUSE_RS_DUMP_GRAPHS: OnceLock<bool> = OnceLock::new();
static FUSE_RS_MAX_FUSE_DEPTH: OnceLock<usize> = OnceLock::new();

const DEFAULT_MAX_FUSE_DEPTH: usize = 256;

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok()
}

pub(crate) fn dump_graphs() -> bool {
    *FUSE_RS_DUMP_GRAPHS.get_or_init(|| match env::var("FUSE_RS_DUMP_GRAPHS") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}

pub(crate) fn default_max_fuse_depth() -> usize {
    *FUSE_RS_MAX_FUSE_DEPTH.get_or_init(|| {
        env::var("FUSE_RS_MAX_FUSE_DEPTH")
            .ok()
            .and_then(|v| parse_usize(&v))
            .filter(|&depth| depth > 0)
            .unwrap_or(DEFAULT_MAX_FUSE_DEPTH)
    })
}
