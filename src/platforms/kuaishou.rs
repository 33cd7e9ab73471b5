use super::traits::{
    DefaultPublish, LoginProbe, MetadataSelectors, PlatformInfo, PlatformSelectors,
    ScheduleControl, Target, UploadSelectors,
};

pub fn info() -> PlatformInfo {
    PlatformInfo {
        id: "kuaishou".into(),
        name: "快手".into(),
        name_en: "Kuaishou".into(),
        login_url: "https://cp.kuaishou.com".into(),
        upload_url: "https://cp.kuaishou.com/article/publish/video".into(),
        post_list_url: "https://cp.kuaishou.com/article/manage/video".into(),
    }
}

pub const SELECTORS: PlatformSelectors = PlatformSelectors {
    login: LoginProbe {
        url: "https://cp.kuaishou.com/article/publish/video",
        logged_out_marker: Target::with_text("div.names div", "机构服务"),
        login_redirect: Some("https://passport.kuaishou.com"),
    },
    upload: UploadSelectors {
        file_input: "input[type=\"file\"]",
        publish_button: Target::exact_text("div", "发布"),
        publish_disabled_class: "disabled",
        error_signal: "[class*=\"upload-fail\"]",
        delete_media: Some(Target::with_text("[class*=\"upload-fail\"] span", "重新上传")),
        delete_confirm: None,
    },
    metadata: MetadataSelectors {
        body_editor: "div#work-description-edit",
        short_title_input: None,
        original_declaration: &[],
        location_opt_out: &[],
    },
    schedule: ScheduleControl::TypedInput {
        toggle: Target::with_text("label", "定时发布"),
        input: "input[placeholder=\"选择日期时间\"]",
        format: "%Y-%m-%d %H:%M:%S",
    },
    schedule_window_days: 14,
    default_publish: DefaultPublish::Immediately,
    cover: None,
};
