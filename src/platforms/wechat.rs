use super::traits::{
    CoverSelectors, DefaultPublish, LoginProbe, MetadataSelectors, PickerSelectors, PlatformInfo,
    PlatformSelectors, ScheduleControl, Target, UploadSelectors,
};

const SHORT_TITLE_MIN_CHARS: usize = 6;
const SHORT_TITLE_MAX_CHARS: usize = 16;
const SHORT_TITLE_SPECIAL_CHARS: &str = "《》\":+?%°";

pub fn info() -> PlatformInfo {
    PlatformInfo {
        id: "wechat".into(),
        name: "微信视频号".into(),
        name_en: "WeChat Channels".into(),
        login_url: "https://channels.weixin.qq.com".into(),
        upload_url: "https://channels.weixin.qq.com/platform/post/create".into(),
        post_list_url: "https://channels.weixin.qq.com/platform/post/list".into(),
    }
}

pub const SELECTORS: PlatformSelectors = PlatformSelectors {
    login: LoginProbe {
        url: "https://channels.weixin.qq.com/platform/post/create",
        logged_out_marker: Target::with_text("div.title-name", "微信小店"),
        login_redirect: Some("https://channels.weixin.qq.com/login"),
    },
    upload: UploadSelectors {
        file_input: "input[type=\"file\"]",
        publish_button: Target::with_text("div.form-btns button", "发表"),
        publish_disabled_class: "weui-desktop-btn_disabled",
        error_signal: "div.status-msg.error",
        delete_media: Some(Target::with_text("div.media-status-content div.tag-inner", "删除")),
        delete_confirm: Some(Target::exact_text("button", "删除")),
    },
    metadata: MetadataSelectors {
        body_editor: "div.input-editor",
        short_title_input: Some("div.short-title-wrap input[type=\"text\"]"),
        original_declaration: &[
            Target::css(".declare-original-checkbox .ant-checkbox-input"),
            Target::css(".weui-desktop-dialog .original-proto-wrapper .ant-checkbox-input"),
            Target::with_text(
                ".weui-desktop-dialog__ft .weui-desktop-btn_primary",
                "声明原创",
            ),
        ],
        location_opt_out: &[
            Target::css("div.position-display-wrap"),
            Target::exact_text("div.option-item .name", "不显示位置"),
        ],
    },
    schedule: ScheduleControl::Picker(PickerSelectors {
        toggle: Target::with_text("label", "定时").nth(1),
        date_input: "input[placeholder=\"请选择发表时间\"]",
        month_label: Target::with_text("span.weui-desktop-picker__panel__label", "月"),
        next_month: "button.weui-desktop-btn__icon__right",
        day_cells: "table.weui-desktop-picker__table a:not(.weui-desktop-picker__disabled)",
        time_input: "input[placeholder=\"请选择时间\"]",
        hour_items: "ol.weui-desktop-picker__time__hour li",
        minute_items: "ol.weui-desktop-picker__time__minute li",
        dismiss: "body",
    }),
    schedule_window_days: 30,
    default_publish: DefaultPublish::NextDayAt(9),
    cover: Some(CoverSelectors {
        open_editor: Target::with_text("div.finder-tag-wrap.btn", "更换封面"),
        editor: "div.cover-control-wrap",
        file_input: "input[type=\"file\"][accept*=\"image\"]",
        crop_window: "div.crop-wrapper.vertical",
        confirm: Target::with_text("button", "确认"),
    }),
};

/// Channels short titles accept 6 to 16 characters from a limited set.
/// Commas become spaces, anything else outside the set is dropped, long
/// titles are cut and short ones are padded with spaces.
pub fn format_short_title(raw: &str) -> String {
    let mut formatted: String = raw
        .chars()
        .filter_map(|c| {
            if c.is_alphanumeric() || SHORT_TITLE_SPECIAL_CHARS.contains(c) {
                Some(c)
            } else if c == ',' || c == '，' {
                Some(' ')
            } else {
                None
            }
        })
        .take(SHORT_TITLE_MAX_CHARS)
        .collect();

    let len = formatted.chars().count();
    if len < SHORT_TITLE_MIN_CHARS {
        formatted.extend(std::iter::repeat(' ').take(SHORT_TITLE_MIN_CHARS - len));
    }
    formatted
}
