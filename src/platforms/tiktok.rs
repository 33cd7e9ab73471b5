use super::traits::{
    DefaultPublish, LoginProbe, MetadataSelectors, PlatformInfo, PlatformSelectors,
    ScheduleControl, Target, UploadSelectors,
};

pub fn info() -> PlatformInfo {
    PlatformInfo {
        id: "tiktok".into(),
        name: "TikTok".into(),
        name_en: "TikTok".into(),
        login_url: "https://www.tiktok.com/login?lang=en".into(),
        upload_url: "https://www.tiktok.com/tiktokstudio/upload?lang=en".into(),
        post_list_url: "https://www.tiktok.com/tiktokstudio/content".into(),
    }
}

// Scheduling on TikTok Studio uses a canvas-like picker; only immediate
// publishing is driven.
pub const SELECTORS: PlatformSelectors = PlatformSelectors {
    login: LoginProbe {
        url: "https://www.tiktok.com/tiktokstudio/upload?lang=en",
        logged_out_marker: Target::css("form[action*=\"login\"], div#loginContainer"),
        login_redirect: Some("https://www.tiktok.com/login"),
    },
    upload: UploadSelectors {
        file_input: "input[type=\"file\"][accept*=\"video\"]",
        publish_button: Target::css("button[data-e2e=\"post_video_button\"]"),
        publish_disabled_class: "disabled",
        error_signal: "div[class*=\"upload-error\"]",
        delete_media: Some(Target::with_text("button", "Replace")),
        delete_confirm: None,
    },
    metadata: MetadataSelectors {
        body_editor: "div.public-DraftEditor-content",
        short_title_input: None,
        original_declaration: &[],
        location_opt_out: &[],
    },
    schedule: ScheduleControl::Unsupported,
    schedule_window_days: 0,
    default_publish: DefaultPublish::Immediately,
    cover: None,
};
