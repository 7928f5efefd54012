//! LLM 服务 - 业务能力层
//!
//! 只负责"调用 LLM 并拿回 JSON"能力，不关心分析流程
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Gemini 的 OpenAI 兼容端点）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, LlmError};

/// 对话模型的最小能力：发消息、拿回文本
///
/// 流程层只依赖这个 trait，测试时可以换成固定回复的实现。
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, user_message: &str, system_message: Option<&str>)
        -> AppResult<String>;

    fn model_name(&self) -> &str;
}

/// LLM 服务
///
/// 职责：
/// - 调用兼容 OpenAI 的 chat completion 接口
/// - 只处理单条消息，不出现 Measure / 批处理概念
pub struct LlmService {
    client: Client<OpenAIConfig>,
    model_name: String,
}

impl LlmService {
    /// 创建新的 LLM 服务
    pub fn new(config: &Config) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.llm_api_key)
            .with_api_base(&config.llm_api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.llm_model_name.clone(),
        }
    }
}

#[async_trait]
impl ChatModel for LlmService {
    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回 LLM 的响应内容（已去掉首尾空白）
    async fn complete(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> AppResult<String> {
        debug!(
            "调用 LLM API，模型: {}，消息长度: {} 字符",
            self.model_name,
            user_message.len()
        );
        let api_error = |e: async_openai::error::OpenAIError| {
            AppError::llm_api_failed(&self.model_name, e)
        };

        let mut messages = Vec::new();
        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(api_error)?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(api_error)?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(0.3)
            .max_tokens(2048u32)
            .build()
            .map_err(api_error)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            api_error(e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| LlmError::EmptyContent {
                model: self.model_name.clone(),
            })?;

        debug!("LLM API 调用成功，响应长度: {}", content.len());
        Ok(content.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

/// 发送提示词并把回复解析成 JSON 对象
pub async fn ask_json(
    model: &dyn ChatModel,
    prompt: &str,
    system_message: Option<&str>,
) -> AppResult<Value> {
    let reply = model.complete(prompt, system_message).await?;
    Ok(parse_json_reply(&reply)?)
}

/// 解析 LLM 回复中的 JSON
///
/// 兼容 ```json 代码块，以及 JSON 前后夹带说明文字的情况
pub fn parse_json_reply(reply: &str) -> Result<Value, LlmError> {
    let trimmed = strip_code_fence(reply.trim());
    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(source) => {
            // 退一步：取第一个 '{' 到最后一个 '}'
            if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
                if start < end {
                    if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                        return Ok(value);
                    }
                }
            }
            Err(LlmError::JsonParseFailed {
                response: crate::utils::truncate_text(reply, 200),
                source,
            })
        }
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // 跳过语言标记所在的第一行
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
