//! Intent classifier
//!
//! Maps a user message (text + attachment flag + new-user flag) to exactly
//! one intent with a confidence score and the matched trigger. Evaluation is
//! pure and deterministic; the rest of the pipeline selects the skill layer
//! from the result.

use crate::models::{Intent, IntentLabel};
use tracing::info;

/// Pattern set for one intent. Phrase matches outrank keyword matches.
struct IntentPatterns {
    label: IntentLabel,
    keywords: &'static [&'static str],
    phrases: &'static [&'static str],
    keyword_confidence: f64,
    phrase_confidence: f64,
}

/// Static pattern tables — zero allocation. Ordered by tie-break priority:
/// invoice_upload > monthly_closure > cmv_query > watchlist.
const INTENT_PATTERNS: &[IntentPatterns] = &[
    IntentPatterns {
        label: IntentLabel::InvoiceUpload,
        keywords: &[
            "nf", "nota fiscal", "cupom", "recibo", "fatura", "nota", "invoice",
        ],
        phrases: &[
            "enviar nota", "processar nota", "recebi uma nota", "recebi a nota",
            "nova nf", "nota do", "nota da",
        ],
        keyword_confidence: 0.85,
        phrase_confidence: 0.92,
    },
    IntentPatterns {
        label: IntentLabel::MonthlyClosure,
        keywords: &[
            "fechamento", "faturamento", "receita", "relatorio", "relatório",
            "fluxo de caixa", "cashflow", "resultado do mes", "resultado do mês",
        ],
        phrases: &[
            "fechamento do mes", "fechamento do mês", "quanto faturou",
            "receita do mes", "receita do mês", "relatorio mensal",
            "relatório mensal", "fechar o mes", "fechar o mês",
        ],
        keyword_confidence: 0.82,
        phrase_confidence: 0.90,
    },
    IntentPatterns {
        label: IntentLabel::CmvQuery,
        keywords: &[
            "cmv", "food cost", "custo do prato", "cardapio", "cardápio",
            "ingrediente", "margem", "rentabilidade", "prato",
        ],
        phrases: &[
            "custo do cardapio", "custo do cardápio", "analise de cmv",
            "análise de cmv", "prato mais caro", "cadastrar prato",
            "adicionar ingrediente", "quanto custa o prato",
            "margem de contribui", "ficha tecnica", "ficha técnica",
        ],
        keyword_confidence: 0.80,
        phrase_confidence: 0.90,
    },
    IntentPatterns {
        label: IntentLabel::Watchlist,
        keywords: &[
            "acompanhar", "monitorar", "alertar", "alerta", "watchlist",
            "observar", "vigiar", "lista de acompanhamento",
        ],
        phrases: &[
            "acompanhar preco", "acompanhar preço", "alertar quando",
            "monitorar preco", "monitorar preço", "lista de precos",
            "lista de preços", "me avise quando", "me avisa quando",
            "observar preco", "observar preço",
        ],
        keyword_confidence: 0.82,
        phrase_confidence: 0.90,
    },
];

/// Direct menu selection: the user picks an option by number.
const MENU_SELECTIONS: &[(&str, IntentLabel)] = &[
    ("1", IntentLabel::InvoiceUpload),
    ("2", IntentLabel::MonthlyClosure),
    ("3", IntentLabel::CmvQuery),
    ("4", IntentLabel::Watchlist),
];

const ATTACHMENT_CONFIDENCE: f64 = 0.95;
const MENU_CONFIDENCE: f64 = 0.95;
const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Intent classifier
pub struct IntentClassifier;

impl IntentClassifier {
    /// Classify a message. Pure function of its three inputs.
    pub fn classify(message: &str, has_attachment: bool, is_new_user: bool) -> Intent {
        // Priority 1: a new user always goes to onboarding
        if is_new_user {
            info!(intent = "onboarding", "intent: new user");
            return Intent {
                label: IntentLabel::Onboarding,
                confidence: 1.0,
                matched_trigger: Some("new_user".to_string()),
            };
        }

        let message = message.to_lowercase();
        let message = message.trim();

        // Priority 2: direct menu selection
        for (digit, label) in MENU_SELECTIONS {
            if message == *digit {
                info!(intent = %label, "intent: menu selection");
                return Intent {
                    label: *label,
                    confidence: MENU_CONFIDENCE,
                    matched_trigger: Some(format!("menu_{}", digit)),
                };
            }
        }

        // Priority 3: pattern matching. Strict `>` keeps earlier (higher
        // priority) intents ahead on confidence ties.
        let mut best: Option<Intent> = None;
        for patterns in INTENT_PATTERNS {
            if let Some(candidate) = patterns.best_match(message) {
                let beats = best
                    .as_ref()
                    .map(|b| candidate.confidence > b.confidence)
                    .unwrap_or(true);
                if beats {
                    best = Some(candidate);
                }
            }
        }

        // Priority 4: an attachment biases toward invoice_upload when no
        // stronger intent matched.
        if has_attachment {
            let outranked = best
                .as_ref()
                .map(|b| b.confidence >= ATTACHMENT_CONFIDENCE)
                .unwrap_or(false);
            if !outranked {
                info!(intent = "invoice_upload", "intent: attachment");
                return Intent {
                    label: IntentLabel::InvoiceUpload,
                    confidence: ATTACHMENT_CONFIDENCE,
                    matched_trigger: Some("attachment".to_string()),
                };
            }
        }

        let result = best.unwrap_or(Intent {
            label: IntentLabel::General,
            confidence: FALLBACK_CONFIDENCE,
            matched_trigger: None,
        });

        info!(
            intent = %result.label,
            confidence = result.confidence,
            trigger = result.matched_trigger.as_deref().unwrap_or("none"),
            "intent classified"
        );

        result
    }
}

impl IntentPatterns {
    /// Best match for this intent against a lowercased message, phrases first.
    fn best_match(&self, message: &str) -> Option<Intent> {
        for phrase in self.phrases {
            if message.contains(phrase) {
                return Some(Intent {
                    label: self.label,
                    confidence: self.phrase_confidence,
                    matched_trigger: Some((*phrase).to_string()),
                });
            }
        }
        for keyword in self.keywords {
            if matches_keyword(message, keyword) {
                return Some(Intent {
                    label: self.label,
                    confidence: self.keyword_confidence,
                    matched_trigger: Some((*keyword).to_string()),
                });
            }
        }
        None
    }
}

/// Whole-word match for single-word keywords, substring for multi-word ones.
/// Prevents "nf" from firing inside unrelated words.
fn matches_keyword(message: &str, keyword: &str) -> bool {
    if keyword.contains(' ') {
        return message.contains(keyword);
    }
    message
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == keyword)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_always_onboarding() {
        for text in ["olá", "quero enviar uma nf", "fechamento do mês", ""] {
            let intent = IntentClassifier::classify(text, false, true);
            assert_eq!(intent.label, IntentLabel::Onboarding);
            assert_eq!(intent.confidence, 1.0);
        }
    }

    #[test]
    fn test_attachment_biases_invoice() {
        let intent = IntentClassifier::classify("segue a foto", true, false);
        assert_eq!(intent.label, IntentLabel::InvoiceUpload);
        assert!(intent.confidence >= 0.9);
    }

    #[test]
    fn test_invoice_keywords() {
        let cases = ["Quero enviar uma NF", "Tenho uma nota fiscal para enviar"];
        for c in cases {
            let intent = IntentClassifier::classify(c, false, false);
            assert_eq!(intent.label, IntentLabel::InvoiceUpload);
        }
    }

    #[test]
    fn test_monthly_phrases() {
        let cases = [
            "Quero fazer o fechamento do mês",
            "preciso fechar o mês",
            "Preciso do relatório mensal",
        ];
        for c in cases {
            let intent = IntentClassifier::classify(c, false, false);
            assert_eq!(intent.label, IntentLabel::MonthlyClosure, "{}", c);
            assert_eq!(intent.confidence, 0.90);
        }
    }

    #[test]
    fn test_phrase_outranks_keyword() {
        // "fechamento do mês" is both a monthly keyword and phrase match;
        // the phrase confidence must win.
        let intent = IntentClassifier::classify("fechamento do mês", false, false);
        assert_eq!(intent.label, IntentLabel::MonthlyClosure);
        assert_eq!(intent.confidence, 0.90);
        assert_eq!(intent.matched_trigger.as_deref(), Some("fechamento do mês"));
    }

    #[test]
    fn test_cmv_queries() {
        let cases = [
            "Qual é o CMV do meu restaurante?",
            "Quero analisar meu cardápio",
            "Preciso criar a ficha técnica",
        ];
        for c in cases {
            let intent = IntentClassifier::classify(c, false, false);
            assert_eq!(intent.label, IntentLabel::CmvQuery, "{}", c);
        }
    }

    #[test]
    fn test_watchlist() {
        let intent = IntentClassifier::classify("Monitorar preço do arroz", false, false);
        assert_eq!(intent.label, IntentLabel::Watchlist);
    }

    #[test]
    fn test_menu_selection() {
        assert_eq!(
            IntentClassifier::classify("1", false, false).label,
            IntentLabel::InvoiceUpload
        );
        assert_eq!(
            IntentClassifier::classify("2", false, false).label,
            IntentLabel::MonthlyClosure
        );
        assert_eq!(
            IntentClassifier::classify(" 3 ", false, false).label,
            IntentLabel::CmvQuery
        );
        assert_eq!(
            IntentClassifier::classify("4", false, false).label,
            IntentLabel::Watchlist
        );
    }

    #[test]
    fn test_fallback_general() {
        let intent = IntentClassifier::classify("Olá, tudo bem?", false, false);
        assert_eq!(intent.label, IntentLabel::General);
        assert_eq!(intent.confidence, 0.5);
        assert!(intent.matched_trigger.is_none());
    }

    #[test]
    fn test_keyword_requires_word_boundary() {
        // "nf" must not fire inside an unrelated word
        let intent = IntentClassifier::classify("informe o horário", false, false);
        assert_eq!(intent.label, IntentLabel::General);
    }

    #[test]
    fn test_tie_break_prefers_invoice_over_cmv() {
        // Both intents match on keywords; invoice carries higher confidence
        let intent = IntentClassifier::classify("nota do ingrediente", false, false);
        assert_eq!(intent.label, IntentLabel::InvoiceUpload);
    }
}
