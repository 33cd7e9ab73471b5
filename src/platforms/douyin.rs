use super::traits::{
    DefaultPublish, LoginProbe, MetadataSelectors, PlatformInfo, PlatformSelectors,
    ScheduleControl, Target, UploadSelectors,
};

pub fn info() -> PlatformInfo {
    PlatformInfo {
        id: "douyin".into(),
        name: "抖音".into(),
        name_en: "Douyin".into(),
        login_url: "https://creator.douyin.com".into(),
        upload_url: "https://creator.douyin.com/creator-micro/content/upload".into(),
        post_list_url: "https://creator.douyin.com/creator-micro/content/manage".into(),
    }
}

pub const SELECTORS: PlatformSelectors = PlatformSelectors {
    login: LoginProbe {
        url: "https://creator.douyin.com/creator-micro/content/upload",
        logged_out_marker: Target::with_text("div", "手机号登录"),
        login_redirect: None,
    },
    upload: UploadSelectors {
        file_input: "input[type=\"file\"]",
        publish_button: Target::exact_text("button", "发布"),
        publish_disabled_class: "disabled",
        error_signal: "div.progress-div [class*=\"fail\"]",
        delete_media: Some(Target::with_text("div.progress-div [class*=\"upload-btn\"]", "重新上传")),
        delete_confirm: None,
    },
    metadata: MetadataSelectors {
        body_editor: ".zone-container",
        short_title_input: Some("input[placeholder*=\"作品标题\"]"),
        original_declaration: &[],
        location_opt_out: &[],
    },
    schedule: ScheduleControl::TypedInput {
        toggle: Target::with_text("label[class*=\"radio\"]", "定时发布"),
        input: ".semi-input[placeholder=\"日期和时间\"]",
        format: "%Y-%m-%d %H:%M",
    },
    schedule_window_days: 14,
    default_publish: DefaultPublish::Immediately,
    cover: None,
};
