//! Vendor profiles
//!
//! One profile per upstream vendor: wire family, endpoint constants, the
//! fallback model used when neither the request nor the configuration
//! names one, and hook functions for vendor quirks. Quirks stay in hooks;
//! the codecs themselves are shared per family.

use crate::core::types::chat::ReasoningMode;

/// Wire protocol family a vendor speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFamily {
    /// OpenAI-style `/chat/completions` with `data:` SSE framing
    OpenAiCompat,
    /// Anthropic Messages API with named SSE events
    Anthropic,
    /// OpenAI-compatible wire, tool calls embedded as XML text in content
    MiniMaxXml,
}

/// Hook remapping the model for a reasoning mode. Applies only when the
/// request leaves the model empty.
pub type ReasoningHook = fn(ReasoningMode) -> Option<&'static str>;

/// Static description of one upstream vendor.
#[derive(Debug, Clone, Copy)]
pub struct VendorProfile {
    /// Provider code used in routing rules and catalogs
    pub code: &'static str,
    pub family: WireFamily,
    pub base_url: &'static str,
    /// Chat completion path appended to the base URL
    pub chat_path: &'static str,
    /// Model listing path (also used as the health probe)
    pub models_path: &'static str,
    /// Last-resort model when request and config leave it empty
    pub fallback_model: &'static str,
    /// Whether the vendor can invoke tools natively
    pub native_tools: bool,
    pub reasoning_hook: Option<ReasoningHook>,
}

fn deepseek_reasoning(mode: ReasoningMode) -> Option<&'static str> {
    match mode {
        ReasoningMode::Thinking | ReasoningMode::Extended => Some("deepseek-reasoner"),
        ReasoningMode::Immediate => None,
    }
}

pub const OPENAI: VendorProfile = VendorProfile {
    code: "openai",
    family: WireFamily::OpenAiCompat,
    base_url: "https://api.openai.com",
    chat_path: "/v1/chat/completions",
    models_path: "/v1/models",
    fallback_model: "gpt-4o-mini",
    native_tools: true,
    reasoning_hook: None,
};

pub const GROK: VendorProfile = VendorProfile {
    code: "grok",
    family: WireFamily::OpenAiCompat,
    base_url: "https://api.x.ai",
    chat_path: "/v1/chat/completions",
    models_path: "/v1/models",
    fallback_model: "grok-beta",
    native_tools: true,
    reasoning_hook: None,
};

pub const QWEN: VendorProfile = VendorProfile {
    code: "qwen",
    family: WireFamily::OpenAiCompat,
    base_url: "https://dashscope.aliyuncs.com",
    chat_path: "/compatible-mode/v1/chat/completions",
    models_path: "/compatible-mode/v1/models",
    fallback_model: "qwen3-235b-a22b",
    native_tools: true,
    reasoning_hook: None,
};

pub const DEEPSEEK: VendorProfile = VendorProfile {
    code: "deepseek",
    family: WireFamily::OpenAiCompat,
    base_url: "https://api.deepseek.com",
    chat_path: "/chat/completions",
    models_path: "/models",
    fallback_model: "deepseek-chat",
    native_tools: true,
    reasoning_hook: Some(deepseek_reasoning),
};

pub const GLM: VendorProfile = VendorProfile {
    code: "glm",
    family: WireFamily::OpenAiCompat,
    base_url: "https://open.bigmodel.cn",
    chat_path: "/api/paas/v4/chat/completions",
    models_path: "/api/paas/v4/models",
    fallback_model: "glm-4",
    native_tools: true,
    reasoning_hook: None,
};

pub const MINIMAX: VendorProfile = VendorProfile {
    code: "minimax",
    family: WireFamily::MiniMaxXml,
    base_url: "https://api.minimax.chat",
    chat_path: "/v1/text/chatcompletion_v2",
    models_path: "/v1/models",
    fallback_model: "abab6.5s-chat",
    native_tools: false,
    reasoning_hook: None,
};

pub const HUNYUAN: VendorProfile = VendorProfile {
    code: "hunyuan",
    family: WireFamily::OpenAiCompat,
    base_url: "https://api.hunyuan.cloud.tencent.com",
    chat_path: "/v1/chat/completions",
    models_path: "/v1/models",
    fallback_model: "hunyuan-turbo",
    native_tools: true,
    reasoning_hook: None,
};

pub const KIMI: VendorProfile = VendorProfile {
    code: "kimi",
    family: WireFamily::OpenAiCompat,
    base_url: "https://api.moonshot.cn",
    chat_path: "/v1/chat/completions",
    models_path: "/v1/models",
    fallback_model: "moonshot-v1-8k",
    native_tools: true,
    reasoning_hook: None,
};

pub const LLAMA: VendorProfile = VendorProfile {
    code: "llama",
    family: WireFamily::OpenAiCompat,
    base_url: "https://api.llama-api.com",
    chat_path: "/chat/completions",
    models_path: "/models",
    fallback_model: "llama3.1-70b",
    native_tools: true,
    reasoning_hook: None,
};

pub const MISTRAL: VendorProfile = VendorProfile {
    code: "mistral",
    family: WireFamily::OpenAiCompat,
    base_url: "https://api.mistral.ai",
    chat_path: "/v1/chat/completions",
    models_path: "/v1/models",
    fallback_model: "mistral-small-latest",
    native_tools: true,
    reasoning_hook: None,
};

pub const CLAUDE: VendorProfile = VendorProfile {
    code: "claude",
    family: WireFamily::Anthropic,
    base_url: "https://api.anthropic.com",
    chat_path: "/v1/messages",
    models_path: "/v1/models",
    fallback_model: "claude-3-5-sonnet-20241022",
    native_tools: true,
    reasoning_hook: None,
};

const PROFILES: &[&VendorProfile] = &[
    &OPENAI, &GROK, &QWEN, &DEEPSEEK, &GLM, &MINIMAX, &HUNYUAN, &KIMI, &LLAMA, &MISTRAL, &CLAUDE,
];

/// Look up a built-in profile by provider code.
pub fn profile_for(code: &str) -> Option<&'static VendorProfile> {
    PROFILES.iter().copied().find(|p| p.code == code)
}

/// Generic profile for a configured provider with no built-in entry.
/// Such providers must configure a base URL and speak the OpenAI wire.
pub const GENERIC_OPENAI: VendorProfile = VendorProfile {
    code: "custom",
    family: WireFamily::OpenAiCompat,
    base_url: "",
    chat_path: "/v1/chat/completions",
    models_path: "/v1/models",
    fallback_model: "",
    native_tools: true,
    reasoning_hook: None,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_by_code() {
        assert_eq!(profile_for("openai").unwrap().fallback_model, "gpt-4o-mini");
        assert_eq!(profile_for("grok").unwrap().base_url, "https://api.x.ai");
        assert!(profile_for("nope").is_none());
    }

    #[test]
    fn qwen_uses_compatible_mode_prefix() {
        let qwen = profile_for("qwen").unwrap();
        assert!(qwen.chat_path.starts_with("/compatible-mode/v1"));
    }

    #[test]
    fn deepseek_remaps_reasoning_modes() {
        let hook = DEEPSEEK.reasoning_hook.unwrap();
        assert_eq!(hook(ReasoningMode::Thinking), Some("deepseek-reasoner"));
        assert_eq!(hook(ReasoningMode::Extended), Some("deepseek-reasoner"));
        assert_eq!(hook(ReasoningMode::Immediate), None);
    }

    #[test]
    fn minimax_has_no_native_tools() {
        assert!(!MINIMAX.native_tools);
        assert_eq!(MINIMAX.family, WireFamily::MiniMaxXml);
    }
}
