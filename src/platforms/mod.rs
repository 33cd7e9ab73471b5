pub mod douyin;
pub mod kuaishou;
pub mod tiktok;
pub mod traits;
pub mod wechat;

pub use traits::{PlatformInfo, PlatformSelectors, Target};

pub const PLATFORM_IDS: [&str; 4] = ["kuaishou", "wechat", "douyin", "tiktok"];

/// Everything the upload workflow needs to know about one platform.
#[derive(Debug, Clone)]
pub struct PlatformProfile {
    pub info: PlatformInfo,
    pub selectors: PlatformSelectors,
    /// Platform rules applied to the sidecar's short title.
    pub short_title: fn(&str) -> String,
}

impl PlatformProfile {
    pub fn id(&self) -> &str {
        &self.info.id
    }

    pub fn format_short_title(&self, raw: &str) -> String {
        (self.short_title)(raw)
    }
}

fn unchanged(raw: &str) -> String {
    raw.to_string()
}

pub fn get_profile(platform: &str) -> Option<PlatformProfile> {
    match platform {
        "kuaishou" => Some(PlatformProfile {
            info: kuaishou::info(),
            selectors: kuaishou::SELECTORS,
            short_title: unchanged,
        }),
        "wechat" | "tencent" => Some(PlatformProfile {
            info: wechat::info(),
            selectors: wechat::SELECTORS,
            short_title: wechat::format_short_title,
        }),
        "douyin" => Some(PlatformProfile {
            info: douyin::info(),
            selectors: douyin::SELECTORS,
            short_title: unchanged,
        }),
        "tiktok" => Some(PlatformProfile {
            info: tiktok::info(),
            selectors: tiktok::SELECTORS,
            short_title: unchanged,
        }),
        _ => None,
    }
}

/// Every supported platform, in `PLATFORM_IDS` order.
pub fn all_platforms() -> Vec<PlatformInfo> {
    PLATFORM_IDS
        .iter()
        .filter_map(|id| get_profile(id))
        .map(|profile| profile.info)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_listed_platform_resolves() {
        let all = all_platforms();
        assert_eq!(all.len(), PLATFORM_IDS.len());
        for (info, id) in all.iter().zip(PLATFORM_IDS) {
            assert_eq!(info.id, id);
            assert!(info.post_list_url.starts_with("https://"));
        }
    }

    #[test]
    fn tencent_is_an_alias_for_channels() {
        assert_eq!(get_profile("tencent").unwrap().id(), "wechat");
        assert!(get_profile("bilibili").is_none());
    }

    #[test]
    fn short_title_policy_is_per_platform() {
        let channels = get_profile("wechat").unwrap();
        assert_eq!(channels.format_short_title("ab"), "ab    ");
        let douyin = get_profile("douyin").unwrap();
        assert_eq!(douyin.format_short_title("ab"), "ab");
    }
}
