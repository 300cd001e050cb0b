use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock};

pub const DEFAULT_BASE_URL: &str = "https://maas-api.cn-huabei-1.xf-yun.com/v1";
pub const DEFAULT_OCR_MODEL: &str = "xophunyuanocr";
pub const DEFAULT_ANALYSIS_MODEL: &str = "xop3qwen1b7";

/// Default transcription prompt for the vision model. The pipeline appends a
/// stricter suffix on top of this (see `ocr`), so edits here stay user-facing.
pub const DEFAULT_OCR_PROMPT: &str = "\
You are an OCR transcription engine.
Return ONLY the raw text exactly as it appears in the image.

Rules:
1) Do NOT describe the image, do NOT explain, do NOT add any extra sentences.
2) Do NOT add quotes around the text.
3) Preserve line breaks. Output each line on its own line.
4) Do NOT translate or rewrite.
5) If you see multiple messages, output them in order, one line per line.
Output plain text only.
";

/// Default extraction template for the analysis model. Supports multiple tasks
/// per OCR blob (one `## ` block each) and asks the model to fold carrier
/// brands into the location field.
pub const DEFAULT_ANALYSIS_PROMPT: &str = r#"# Role
You are an advanced Text Parsing Engine. Your job is to extract ALL actionable To-Do items from OCR text.

# Critical Constraints
1. **IGNORE EXAMPLES**: The examples provided below are for formatting reference ONLY. Do NOT output the examples. Only process the text provided in the "TARGET INPUT" section.
2. **NO Hallucinations**: Do not invent dates, places, or codes that do not appear in the text.
3. **Output Language**: Simplified Chinese.
4. **Format**: Strictly follow the Markdown template below. The `地点` field must, when possible, include a brand name plus the place (e.g. "顺丰北门驿站", "丰巢西门柜机").
5. **Multiple Tasks**: The OCR text may contain multiple actionable tasks. Extract ALL actionable tasks.
6. **No Cross-Contamination**: Do NOT mix fields across unrelated messages. If the input contains multiple messages (e.g., lines like "消息 1:" / timestamps / blank-line separated SMS), treat each message as an independent context. A pickup code from Message A must never be assigned to an eating plan in Message B.
7. **Time Format**: Keep time expressions as-is. Do NOT append AM/PM or invent suffixes.
8. **Bilingual Input**: The input may contain English. You may translate the action/description to Simplified Chinese, but do NOT invent facts.

# Extraction Logic
0. **Ignore Wrappers**: If the text contains meta lines like "Here's a text message..." / "The time is ..." / surrounding quotes, ignore those wrappers and only extract tasks from the actual message content.
1. **Identify Actions**: Find every actionable task/plan in the text (e.g., 取快递, 参加会议, 交水电费, 领取外卖, 提交材料, 吃饭, 运动/打篮球/健身…). Any sentence like "I will ..." / "我要..." / "去..." that implies an action should be treated as a task.
2. **Extract Time**: For each task, look for explicit time expressions like "12月21日", "20:00", or relative terms like "今晚"、"明天"、"尽快".
3. **Extract Location (with Brand)**: If text mentions a logistics/brand (顺丰/丰巢/菜鸟/京东/EMS/申通/中通/圆通等) and a place/站/柜机/驿站/点，combine them into a single location string (e.g. "顺丰北门驿站"). If brand appears on a separate line, merge it with the nearest location descriptor.
4. **Extract Key ID**: For each task, look for numeric codes or pickup codes (e.g. "889901", "3-3-21011"). Bold this in output.

# Output Rules
- If there are NO actionable tasks, output exactly: 无任务
- If there are one or more tasks, output one task per block using the template below.
- If a field is missing for a task, output: 无（do not write long placeholders like “若无则留空…”）
- Do NOT add any extra commentary, numbering, or headers beyond the blocks.
- Separate blocks by a blank line.

# Output Template (repeat for each task)
## [Action Name] **Short Description**
- ⏰ **时间**: [Time]
- 📍 **地点**: [Location with brand if applicable]
- 🔑 **关键信息**: **[Code/ID]**

# Reference Examples (DO NOT COPY THESE)
<examples>
    Input: "丰巢 取件码889901，西门柜机"
    Output:
    ## [取快递] **去西门丰巢取件**
    - ⏰ **时间**: 尽快
    - 📍 **地点**: 丰巢西门柜机
    - 🔑 **关键信息**: **889901**

    Input: "顺丰北门驿站 取件码 3-3-21011"
    Output:
    ## [取快递] **去顺丰北门驿站取件**
    - ⏰ **时间**: 尽快
    - 📍 **地点**: 顺丰北门驿站
    - 🔑 **关键信息**: **3-3-21011**

    Input: "I will go eat at 20:00 in KFC\n3:21 PM SMS\nyou have a SF package to receive, please go to the north gate deliver station with number : 123456\n3:21 PM"
    Output:
    ## [吃饭] **去KFC吃晚饭**
    - ⏰ **时间**: 20:00
    - 📍 **地点**: KFC
    - 🔑 **关键信息**: **无**

    ## [取快递] **去顺丰北门驿站取件**
    - ⏰ **时间**: 尽快
    - 📍 **地点**: 顺丰北门驿站
    - 🔑 **关键信息**: **123456**
</examples>

# TARGET INPUT (Process THIS text only)
"#;

/// Endpoint + credentials for one remote model, consumed as opaque strings by
/// the invokers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<String>,
}

impl ModelConfig {
    pub fn default_ocr() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: String::new(),
            model_name: DEFAULT_OCR_MODEL.into(),
            app_id: None,
        }
    }

    pub fn default_analysis() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: String::new(),
            model_name: DEFAULT_ANALYSIS_MODEL.into(),
            app_id: None,
        }
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub ocr: ModelConfig,
    pub analysis: ModelConfig,
    pub ocr_prompt: String,
    pub analysis_prompt: String,
    /// When set, the analysis call reuses the OCR endpoint and credentials.
    pub use_same_config: bool,
    /// When set, the captured frame is written here as JPEG before OCR.
    pub debug_frame_path: Option<PathBuf>,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self {
            ocr: ModelConfig::default_ocr(),
            analysis: ModelConfig::default_analysis(),
            ocr_prompt: DEFAULT_OCR_PROMPT.into(),
            analysis_prompt: DEFAULT_ANALYSIS_PROMPT.into(),
            use_same_config: false,
            debug_frame_path: None,
        }
    }
}

impl AiSettings {
    pub fn analysis_config(&self) -> &ModelConfig {
        if self.use_same_config {
            &self.ocr
        } else {
            &self.analysis
        }
    }
}

pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<AiSettings>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            AiSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn ai(&self) -> AiSettings {
        self.data.read().unwrap().clone()
    }

    pub fn update(&self, settings: AiSettings) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        *guard = settings;
        self.persist(&guard)
    }

    pub fn save_ocr_prompt(&self, prompt: String) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.ocr_prompt = prompt;
        self.persist(&guard)
    }

    pub fn save_analysis_prompt(&self, prompt: String) -> Result<()> {
        let mut guard = self.data.write().unwrap();
        guard.analysis_prompt = prompt;
        self.persist(&guard)
    }

    pub fn reset_ocr_prompt(&self) -> Result<()> {
        self.save_ocr_prompt(DEFAULT_OCR_PROMPT.into())
    }

    pub fn reset_analysis_prompt(&self) -> Result<()> {
        self.save_analysis_prompt(DEFAULT_ANALYSIS_PROMPT.into())
    }

    fn persist(&self, data: &AiSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write config to {}", self.path.display()))
    }
}
