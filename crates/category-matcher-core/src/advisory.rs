//! Advisory cross-check: prompt construction and the [`Verifier`] boundary.
//!
//! After the cascade has decided, the product, the chosen category chain, and
//! the ranked candidates are sent to a text-generation model for a second
//! opinion. Its answer is attached to the result record as-is and never
//! changes the cascade's decision.

use async_trait::async_trait;

use crate::chain::CategoryChain;
use crate::models::ScoredCandidate;

/// System instruction sent with every advisory prompt.
pub const SYSTEM_INSTRUCTION: &str =
    "Ты — помощник, который определяет категорию товара по его названию.";

/// Outcome of one cross-check call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advisory {
    /// Raw model answer.
    Response(String),
    /// Transport, status, or format failure, or no verifier configured.
    Unavailable,
}

impl Advisory {
    pub fn is_available(&self) -> bool {
        matches!(self, Advisory::Response(_))
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            Advisory::Response(text) => Some(text),
            Advisory::Unavailable => None,
        }
    }
}

/// A remote text-generation endpoint used as the final cross-check.
///
/// Implementations never fail: every error is reported as
/// [`Advisory::Unavailable`].
#[async_trait]
pub trait Verifier: Send + Sync {
    /// Short provider name for logs and diagnostics.
    fn name(&self) -> &str;

    async fn verify(&self, system: &str, prompt: &str) -> Advisory;
}

/// A verifier that is always unavailable.
pub struct DisabledVerifier;

#[async_trait]
impl Verifier for DisabledVerifier {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn verify(&self, _system: &str, _prompt: &str) -> Advisory {
        Advisory::Unavailable
    }
}

/// Numbered listing of candidates, one per line:
/// `1. Генераторы>Бензиновые (Генератор бензиновый) — 91.3% [SKU: 1001]`.
pub fn format_candidates(candidates: &[ScoredCandidate<'_>]) -> String {
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            format!(
                "{}. {} ({}) — {}% [SKU: {}]",
                i + 1,
                c.entry.category_path,
                c.entry.name,
                c.percent_label(),
                c.entry.id
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The "structured category chain" section, or an empty string when no
/// category was selected.
pub fn chain_block(chain: &CategoryChain) -> String {
    if chain.is_empty() {
        return String::new();
    }
    format!(
        "\nСтруктурированная цепочка категорий для товара:\n{}\n",
        chain.render()
    )
}

/// Build the user prompt for one product.
pub fn build_prompt(
    product_name: &str,
    chain: &CategoryChain,
    candidates: &[ScoredCandidate<'_>],
) -> String {
    format!(
        "Ты — эксперт по технике и запчастям с 20-летним опытом. Твоя задача — максимально точно определить категорию товара по его названию.

Правила анализа:
1. Внимательно изучи название товара: \"{name}\"
2. Определи основной тип техники (например: мотоблок, генератор, скутер и т.д.)
3. Проанализируй все варианты ниже и выбери наиболее точное соответствие
4. Если сомневаешься (уверенность < 95%) — укажи \"Пропустить\"
5. Для точных совпадений (уверенность ≥ 99.9%) укажи точный процент

Дополнительные указания:
- Учитывай специфику товара (запчасть, аксессуар, комплект и т.д.)
- Проверь соответствие бренда и модели
- Игнорируй общие категории в пользу более специфичных
{chain}
Топ вариантов:
{candidates}

Формат ответа (строго соблюдай):
category: [уровень 1]
category!: [уровень 2]
category!!: [уровень 3]
...
Комментарий: [только число 50-100, % уверенности]

Пример правильного ответа:
category: Мотозапчасти
category!: Амортизаторы и подвеска
category!!: Амортизаторы задние
Комментарий: 99
",
        name = product_name,
        chain = chain_block(chain),
        candidates = format_candidates(candidates),
    )
}
