//! System instruction rendering.

use patchloop_tools::cache::FileCache;
use std::fmt::Write as _;

/// Base prompt followed by every cached file.
pub fn system_instruction(base: &str, cache: &FileCache) -> String {
    let entries = cache.entries();
    if entries.is_empty() {
        return base.to_string();
    }

    let mut out = String::with_capacity(base.len() + entries.iter().map(|(_, c)| c.len() + 64).sum::<usize>());
    out.push_str(base.trim_end());
    out.push_str(
        "\n\n## Files in context\n\
         These files were read, created or edited during this session. \
         The contents below are current; do not read them again.\n",
    );
    for (path, content) in entries {
        let _ = write!(out, "\n### {}\n```\n{}", path.display(), content);
        if !content.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cache_is_base_only() {
        assert_eq!(system_instruction("You are helpful.", &FileCache::new()), "You are helpful.");
    }

    #[test]
    fn renders_each_file() {
        let cache = FileCache::new();
        cache.insert("src/main.rs", "fn main() {}");
        cache.insert("README.md", "# Title\n");

        let text = system_instruction("Base.\n", &cache);
        assert!(text.starts_with("Base.\n\n## Files in context"));
        assert!(text.contains("### README.md\n```\n# Title\n```\n"));
        assert!(text.contains("### src/main.rs\n```\nfn main() {}\n```\n"));
        assert!(text.find("README.md").unwrap() < text.find("src/main.rs").unwrap());
    }
}
