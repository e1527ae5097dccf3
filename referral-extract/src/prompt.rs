use serde::{Deserialize, Serialize};

use crate::models::{ExtractionRequest, ImageAttachment};

/// Instruction sent with every referral letter.
pub const EXTRACTION_PROMPT: &str = r#"あなたは在宅医療に携わる医師です。
提供された診療情報提供書（紹介状）を読み取り、初診時に必要な患者情報を抽出してください。
画像やページが複数ある場合は、すべてを統合して1人の患者の情報としてまとめてください。

## 出力形式
- 次のキーを持つJSONオブジェクトを1つだけ返してください。Markdownのコードブロックや説明文は付けないでください。
- 値は文字列とします。複数の項目がある場合は文字列の配列でも構いません。
- 紹介状に記載がない項目は空文字列 "" としてください。推測で補わないでください。

{
  "name": "患者氏名",
  "date_of_birth": "生年月日（記載どおり）",
  "chief_complaint": "主訴・紹介理由",
  "history": "既往歴・経過",
  "medications": "内服薬（薬剤名・用量・用法、頓服薬を含む）",
  "allergies": "薬剤・食物アレルギー（「なし」と「不明」を区別）",
  "acp_preferences": "ACP：急変時対応、延命治療、DNR、療養場所などの意向",
  "diagnosis": "病名（先頭に # を付ける）"
}
"#;

/// What the extraction client sends to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub text: String,
    pub images: Vec<ImageAttachment>,
}

/// Build the prompt for a request whose images are already prepared.
pub fn build_prompt(request: &ExtractionRequest) -> Prompt {
    match request {
        ExtractionRequest::Text(text) => Prompt {
            text: format!("{}\n入力テキスト:\n{}", EXTRACTION_PROMPT, text.trim()),
            images: Vec::new(),
        },
        ExtractionRequest::Images(images) => Prompt {
            text: format!(
                "{}\n添付画像: {}枚（すべて同じ患者の紹介状です）",
                EXTRACTION_PROMPT,
                images.len()
            ),
            images: images.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Field, MediaType};

    #[test]
    fn test_template_names_every_field() {
        for key in Field::ALL.map(|f| f.key()) {
            assert!(
                EXTRACTION_PROMPT.contains(&format!("\"{}\"", key)),
                "prompt is missing {}",
                key
            );
        }
    }

    #[test]
    fn test_text_prompt_appends_letter() {
        let prompt = build_prompt(&ExtractionRequest::text("  患者：山田太郎  \n"));

        assert!(prompt.text.starts_with(EXTRACTION_PROMPT));
        assert!(prompt.text.ends_with("入力テキスト:\n患者：山田太郎"));
        assert!(prompt.images.is_empty());
    }

    #[test]
    fn test_image_prompt_carries_attachments() {
        let request = ExtractionRequest::images(vec![
            ImageAttachment::new(vec![1], MediaType::Png),
            ImageAttachment::new(vec![2], MediaType::Jpeg),
        ]);

        let prompt = build_prompt(&request);

        assert_eq!(prompt.images.len(), 2);
        assert!(prompt.text.contains("2枚"));
        assert!(!prompt.text.contains("入力テキスト"));
    }
}
