//! Rule tables for classification, risk scoring and local simplification.
//!
//! The built-in tables are static data compiled once into [`RuleTables`];
//! `rules` overrides from the config file are appended (or replace them).
//! The compiled tables are immutable and shared behind an `Arc`.

use crate::models::{ClauseCategory, ClauseImportance, RiskLevel};
use crate::services::config_store::{ConfigurationError, RulesConfig};
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;

// ── Category keywords ───────────────────────────────────────────────

struct KeywordSet {
    category: ClauseCategory,
    patterns: &'static [(&'static str, u32)],
}

static CATEGORY_KEYWORDS: &[KeywordSet] = &[
    KeywordSet {
        category: ClauseCategory::Liability,
        patterns: &[
            (r"\bliabilit(?:y|ies)\b", 3),
            (r"\bliable\b", 3),
            (r"\bindemnif\w*", 3),
            (r"\bhold\s+harmless\b", 3),
            (r"\bdamages\b", 2),
            (r"\bnegligen\w*", 2),
            (r"\bconsequential\b", 1),
            (r"\blosses\b", 1),
        ],
    },
    KeywordSet {
        category: ClauseCategory::Termination,
        patterns: &[
            (r"\bterminat\w*", 3),
            (r"\bcancel\w*", 2),
            (r"\bexpir\w*", 2),
            (r"\bat\s+will\b", 2),
            (r"\bfor\s+convenience\b", 2),
            (r"\brenew\w*", 1),
            (r"\bnotice\s+period\b", 1),
        ],
    },
    KeywordSet {
        category: ClauseCategory::Warranty,
        patterns: &[
            (r"\bwarrant\w*", 3),
            (r"\bguarante\w*", 2),
            (r"\brepresent(?:s|ations?)\b", 1),
            (r"\bas\s+is\b", 2),
            (r"\bmerchantability\b", 2),
            (r"\bfitness\s+for\s+a\s+particular\s+purpose\b", 2),
            (r"\bdefect\w*", 1),
        ],
    },
    KeywordSet {
        category: ClauseCategory::Financial,
        patterns: &[
            (r"\bpay(?:s|ment|ments|able|ing)?\b", 3),
            (r"\bfees?\b", 2),
            (r"\bprice\w*", 2),
            (r"\binvoic\w*", 2),
            (r"\brefund\w*", 2),
            (r"\bpenalt(?:y|ies)\b", 2),
            (r"\binterest\b", 1),
            (r"\bcosts?\b", 1),
            (r"\$\s?\d", 2),
        ],
    },
    KeywordSet {
        category: ClauseCategory::Confidentiality,
        patterns: &[
            (r"\bconfidential\w*", 3),
            (r"\bnon-?disclosure\b", 3),
            (r"\bproprietary\b", 2),
            (r"\btrade\s+secrets?\b", 2),
            (r"\bdisclos\w*", 2),
            (r"\bprivacy\b", 1),
            (r"\bpersonal\s+data\b", 1),
        ],
    },
];

// ── Risk rules ──────────────────────────────────────────────────────

struct RiskRuleDef {
    id: &'static str,
    pattern: &'static str,
    severity: RiskLevel,
    rationale: &'static str,
    /// Empty applies to every category.
    scope: &'static [ClauseCategory],
}

use ClauseCategory as C;

static RISK_RULES: &[RiskRuleDef] = &[
    RiskRuleDef {
        id: "unlimited_liability",
        pattern: r"\bunlimited\s+liabilit(?:y|ies)\b|\bliability\s+(?:shall\s+be\s+|is\s+)?unlimited\b|\bwithout\s+(?:any\s+)?limit(?:ation)?\s+(?:of|on)\s+liability\b",
        severity: RiskLevel::High,
        rationale: "Uncapped exposure (\"{match}\"): there is no upper limit on what you could owe.",
        scope: &[C::Liability],
    },
    RiskRuleDef {
        id: "personal_guarantee",
        pattern: r"\bpersonal(?:ly)?\s+guarant\w*|\bpersonally\s+liable\b",
        severity: RiskLevel::High,
        rationale: "Personal guarantee (\"{match}\"): your own assets may be at risk.",
        scope: &[],
    },
    RiskRuleDef {
        id: "broad_indemnity",
        pattern: r"\bindemnif\w*[^.]{0,80}?\bany\s+and\s+all\b",
        severity: RiskLevel::High,
        rationale: "Broad indemnity (\"{match}\"): you may have to cover any and all claims.",
        scope: &[],
    },
    RiskRuleDef {
        id: "termination_without_notice",
        pattern: r"\bterminat\w*[^.]{0,40}?\b(?:immediately|without\s+(?:prior\s+)?notice)\b",
        severity: RiskLevel::High,
        rationale: "Termination without notice (\"{match}\"): the agreement can end with no warning.",
        scope: &[C::Termination],
    },
    RiskRuleDef {
        id: "waiver_of_rights",
        pattern: r"\bwaives?\s+(?:any\s+|all\s+|its\s+|their\s+|his\s+|her\s+)*(?:legal\s+)?(?:rights?|claims?)\b|\bwaiver\s+of\s+(?:any\s+|all\s+)?(?:rights?|claims?)\b",
        severity: RiskLevel::High,
        rationale: "Waiver of rights (\"{match}\"): you give up protections you would otherwise have.",
        scope: &[],
    },
    RiskRuleDef {
        id: "class_action_waiver",
        pattern: r"\bclass\s+action\b|\bjury\s+trial\b",
        severity: RiskLevel::High,
        rationale: "Limits on collective or jury claims (\"{match}\").",
        scope: &[],
    },
    RiskRuleDef {
        id: "ip_assignment",
        pattern: r"\bassigns?\s+(?:all\s+)?(?:right,?\s+title\s+and\s+interest|intellectual\s+property)|\ball\s+intellectual\s+property\s+(?:rights\s+)?(?:shall\s+)?(?:vest|belong)",
        severity: RiskLevel::High,
        rationale: "Intellectual property transfer (\"{match}\"): you may lose ownership of your work.",
        scope: &[],
    },
    RiskRuleDef {
        id: "non_compete",
        pattern: r"\bnon-?compet\w*|\bshall\s+not\s+compete\b|\brestrictive\s+covenants?\b",
        severity: RiskLevel::High,
        rationale: "Non-compete restriction (\"{match}\"): limits where you can work or do business.",
        scope: &[],
    },
    RiskRuleDef {
        id: "liquidated_damages",
        pattern: r"\bliquidated\s+damages\b|\bpunitive\s+damages\b",
        severity: RiskLevel::High,
        rationale: "Pre-set or punitive damages (\"{match}\").",
        scope: &[],
    },
    RiskRuleDef {
        id: "at_will_termination",
        pattern: r"\bat\s+will\b|\bfor\s+convenience\b|\bfor\s+any\s+reason\b|\bwithout\s+cause\b",
        severity: RiskLevel::Medium,
        rationale: "Termination at will (\"{match}\"): the other side can end the agreement at any time.",
        scope: &[C::Termination],
    },
    RiskRuleDef {
        id: "automatic_renewal",
        pattern: r"\bauto(?:matic(?:ally)?)?[\s-]+renew\w*|\brenews?\s+automatically\b|\bevergreen\b",
        severity: RiskLevel::Medium,
        rationale: "Automatic renewal (\"{match}\"): the agreement continues unless you cancel in time.",
        scope: &[],
    },
    RiskRuleDef {
        id: "sole_discretion",
        pattern: r"\b(?:sole|absolute)\s+(?:and\s+absolute\s+)?discretion\b",
        severity: RiskLevel::Medium,
        rationale: "One-sided discretion (\"{match}\"): decisions rest with one party alone.",
        scope: &[],
    },
    RiskRuleDef {
        id: "unilateral_amendment",
        pattern: r"\b(?:may|reserves\s+the\s+right\s+to)\s+(?:amend|modify|change)\s+(?:this\s+agreement|these\s+terms)\b",
        severity: RiskLevel::Medium,
        rationale: "Unilateral changes (\"{match}\"): terms can change without your agreement.",
        scope: &[],
    },
    RiskRuleDef {
        id: "late_payment_penalty",
        pattern: r"\blate\s+(?:payment\s+)?(?:fees?|charges?|penalt(?:y|ies))\b|\binterest\s+(?:at|of)\s+\d+(?:\.\d+)?\s*%",
        severity: RiskLevel::Medium,
        rationale: "Late payment penalty (\"{match}\").",
        scope: &[C::Financial],
    },
    RiskRuleDef {
        id: "non_refundable",
        pattern: r"\bnon-?refundable\b",
        severity: RiskLevel::Medium,
        rationale: "Non-refundable payment (\"{match}\"): money paid cannot be recovered.",
        scope: &[C::Financial],
    },
    RiskRuleDef {
        id: "attorney_fees",
        pattern: r"\battorneys?'?\s+fees\b|\blegal\s+(?:fees|costs)\b",
        severity: RiskLevel::Medium,
        rationale: "Legal cost shifting (\"{match}\"): you may pay the other side's lawyers.",
        scope: &[],
    },
    RiskRuleDef {
        id: "warranty_disclaimer",
        pattern: r#"\bas\s+is\b|\bdisclaims?\s+(?:all\s+|any\s+)?(?:warrant\w*|liabilit\w*)|\bwithout\s+warrant\w*"#,
        severity: RiskLevel::Medium,
        rationale: "Warranty disclaimer (\"{match}\"): little recourse if something is defective.",
        scope: &[C::Warranty],
    },
    RiskRuleDef {
        id: "perpetual_obligation",
        pattern: r"\bperpetu(?:al|ity)\b|\bsurvives?\s+(?:indefinitely|any\s+termination|termination)\b",
        severity: RiskLevel::Medium,
        rationale: "Open-ended obligation (\"{match}\"): the duty may never expire.",
        scope: &[],
    },
    RiskRuleDef {
        id: "binding_arbitration",
        pattern: r"\bbinding\s+arbitration\b|\bexclusive\s+jurisdiction\b",
        severity: RiskLevel::Medium,
        rationale: "Dispute forum fixed (\"{match}\"): court options are restricted.",
        scope: &[],
    },
    RiskRuleDef {
        id: "liability_cap",
        pattern: r"\bliability\s+(?:shall\s+be\s+|is\s+)?(?:limited|capped)\b|\b(?:limitation|cap)\s+(?:of|on)\s+liability\b",
        severity: RiskLevel::Low,
        rationale: "Liability is limited (\"{match}\").",
        scope: &[C::Liability],
    },
    RiskRuleDef {
        id: "notice_period",
        pattern: r"\b(?:\d{1,3}|thirty|sixty|ninety)\s+(?:\(\d{1,3}\)\s+)?days'?\s+(?:prior\s+)?(?:written\s+)?notice\b",
        severity: RiskLevel::Low,
        rationale: "Notice period stated (\"{match}\").",
        scope: &[],
    },
    RiskRuleDef {
        id: "cure_period",
        pattern: r"\bcure\s+(?:period|such\s+breach|the\s+breach)\b|\bopportunity\s+to\s+cure\b",
        severity: RiskLevel::Low,
        rationale: "A cure period applies (\"{match}\").",
        scope: &[C::Termination],
    },
    RiskRuleDef {
        id: "mutual_obligation",
        pattern: r"\bmutual(?:ly)?\b|\beach\s+party\b|\bboth\s+parties\b",
        severity: RiskLevel::Low,
        rationale: "Obligation applies to both sides (\"{match}\").",
        scope: &[],
    },
];

// ── Plain-language substitutions ────────────────────────────────────

static SUBSTITUTIONS: &[(&str, &str)] = &[
    ("unlimited liability", "responsibility for all losses with no upper limit"),
    ("in the event that", "if"),
    ("notwithstanding", "even though"),
    ("pursuant to", "following"),
    ("in accordance with", "following"),
    ("for the purposes of", "for"),
    ("prior to", "before"),
    ("subsequent to", "after"),
    ("in lieu of", "instead of"),
    ("provided that", "as long as"),
    ("inter alia", "among other things"),
    ("mutatis mutandis", "with the necessary changes"),
    ("null and void", "invalid"),
    ("force majeure", "events no one can control"),
    ("hold harmless", "protect from blame"),
    ("indemnification", "paying for someone else's losses"),
    ("indemnify", "cover the losses of"),
    ("hereinafter", "from now on"),
    ("heretofore", "until now"),
    ("hereby", "by this document"),
    ("herein", "in this document"),
    ("hereto", "to this document"),
    ("thereof", "of it"),
    ("therein", "in it"),
    ("aforementioned", "mentioned earlier"),
    ("aforesaid", "mentioned earlier"),
    ("whereas", "since"),
    ("forthwith", "immediately"),
    ("remuneration", "payment"),
    ("commencement", "start"),
    ("commence", "start"),
    ("utilize", "use"),
    ("terminated", "ended"),
    ("termination", "ending"),
    ("terminate", "end"),
    ("at will", "at any time for any reason"),
    ("liability", "legal responsibility"),
    ("liable", "legally responsible"),
    ("breach", "breaking of the agreement"),
    ("shall not", "must not"),
    ("shall be", "will be"),
    ("shall", "must"),
    ("arbitration", "private dispute resolution"),
    ("jurisdiction", "legal authority"),
    ("confidential information", "private information"),
    ("warranties", "promises"),
    ("warranty", "promise"),
    ("disclose", "share"),
];

// ── Importance and explanations ─────────────────────────────────────

/// Highest tier first; the first tier with any hit decides.
static IMPORTANCE_TERMS: &[(ClauseImportance, &[&str])] = &[
    (
        ClauseImportance::High,
        &[
            "shall", "must", "required", "mandatory", r"obligat\w*", "liable",
            r"responsib\w*", r"penalt(?:y|ies)", r"breach\w*", r"default\w*",
        ],
    ),
    (
        ClauseImportance::Medium,
        &[
            "should", "may", "can", "will", r"agree\w*", r"covenants?",
            r"undertak\w*", r"consent\w*", r"approv\w*",
        ],
    ),
];

static CATEGORY_EXPLANATIONS: &[(ClauseCategory, &str)] = &[
    (
        ClauseCategory::Liability,
        "This clause decides who pays for damage or losses if something goes wrong. \
It shapes how much financial risk you carry under the agreement.",
    ),
    (
        ClauseCategory::Termination,
        "This clause sets out when and how the agreement can end. \
It also covers what happens once it has ended.",
    ),
    (
        ClauseCategory::Warranty,
        "This is a promise about the quality or condition of something. \
If the promise is broken you may be entitled to a repair or compensation.",
    ),
    (
        ClauseCategory::Financial,
        "This clause covers the money you pay and when you pay it. \
It also says what happens if a payment is missed.",
    ),
    (
        ClauseCategory::Confidentiality,
        "This clause requires you to keep certain information private. \
Sharing it could lead to legal claims or penalties.",
    ),
    (
        ClauseCategory::General,
        "This clause sets general rules for the agreement as a whole. \
It frames the basic duties of both parties.",
    ),
];

struct ExplanationWarningDef {
    id: &'static str,
    pattern: &'static str,
    message: &'static str,
    scope: &'static [ClauseCategory],
}

static EXPLANATION_WARNINGS: &[ExplanationWarningDef] = &[
    ExplanationWarningDef {
        id: "unlimited_exposure",
        pattern: r"\bunlimited\b|\bwithout\s+(?:any\s+)?limit\b",
        message: "Warning: this clause may expose you to unlimited financial risk.",
        scope: &[],
    },
    ExplanationWarningDef {
        id: "automatic_renewal",
        pattern: r"\bautomatic(?:ally)?\b",
        message: "Note: the agreement may renew automatically unless you take action.",
        scope: &[C::Termination],
    },
    ExplanationWarningDef {
        id: "mandatory_obligation",
        pattern: r"\bshall\b|\bmust\b",
        message: "Important: this creates obligations you are required to fulfil.",
        scope: &[],
    },
];

// ── Compiled tables ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WeightedPattern {
    pub regex: Regex,
    pub weight: u32,
}

#[derive(Debug, Clone)]
pub struct CategoryPatterns {
    pub category: ClauseCategory,
    pub patterns: Vec<WeightedPattern>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleScope {
    Any,
    Categories(Vec<ClauseCategory>),
}

impl RuleScope {
    pub fn applies_to(&self, category: ClauseCategory) -> bool {
        match self {
            Self::Any => true,
            Self::Categories(cats) => cats.contains(&category),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskRule {
    pub id: String,
    pub regex: Regex,
    pub severity: RiskLevel,
    /// `{match}` is replaced with the matched text.
    pub rationale: String,
    pub scope: RuleScope,
}

impl RiskRule {
    pub fn render_rationale(&self, matched: &str) -> String {
        self.rationale.replace("{match}", matched.trim())
    }
}

/// Term matcher for the local simplifier: one alternation, longest terms first.
#[derive(Debug, Clone)]
pub struct SubstitutionTable {
    matcher: Option<Regex>,
    plain: HashMap<String, String>,
}

impl SubstitutionTable {
    fn compile(pairs: Vec<(String, String)>) -> Result<Self, ConfigurationError> {
        let mut plain: HashMap<String, String> = HashMap::new();
        for (term, replacement) in pairs {
            let key = term_key(&term);
            if key.is_empty() {
                continue;
            }
            plain.insert(key, replacement);
        }
        if plain.is_empty() {
            return Ok(Self { matcher: None, plain });
        }

        let mut terms: Vec<&String> = plain.keys().collect();
        terms.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = terms
            .iter()
            .map(|t| {
                t.split(' ')
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+")
            })
            .collect::<Vec<_>>()
            .join("|");
        let pattern = format!(r"(?i)\b(?:{})\b", alternation);
        let matcher = Regex::new(&pattern).map_err(|source| ConfigurationError::InvalidPattern {
            rule: "substitutions".to_string(),
            pattern: "<term alternation>".to_string(),
            source,
        })?;
        Ok(Self {
            matcher: Some(matcher),
            plain,
        })
    }

    pub fn matcher(&self) -> Option<&Regex> {
        self.matcher.as_ref()
    }

    /// Plain replacement for a matched term, whatever its case or spacing.
    pub fn plain_for(&self, matched: &str) -> Option<&str> {
        self.plain.get(&term_key(matched)).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plain.is_empty()
    }
}

/// One alternation per importance tier, highest tier first.
#[derive(Debug, Clone)]
pub struct ImportanceTable {
    tiers: Vec<(ClauseImportance, Regex)>,
}

impl ImportanceTable {
    fn compile() -> Result<Self, ConfigurationError> {
        let tiers = IMPORTANCE_TERMS
            .iter()
            .map(|(importance, terms)| {
                let pattern = format!(r"\b(?:{})\b", terms.join("|"));
                compile_pattern(importance.as_str(), &pattern).map(|regex| (*importance, regex))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { tiers })
    }

    pub fn tiers(&self) -> &[(ClauseImportance, Regex)] {
        &self.tiers
    }
}

#[derive(Debug, Clone)]
pub struct ExplanationWarning {
    pub id: String,
    pub regex: Regex,
    pub message: String,
    pub scope: RuleScope,
}

/// Base explanation per category plus wording-triggered warnings.
#[derive(Debug, Clone)]
pub struct ExplanationTable {
    base: HashMap<ClauseCategory, String>,
    warnings: Vec<ExplanationWarning>,
}

impl ExplanationTable {
    fn compile() -> Result<Self, ConfigurationError> {
        let base = CATEGORY_EXPLANATIONS
            .iter()
            .map(|(category, text)| (*category, text.to_string()))
            .collect();
        let warnings = EXPLANATION_WARNINGS
            .iter()
            .map(|def| {
                Ok(ExplanationWarning {
                    id: def.id.to_string(),
                    regex: compile_pattern(def.id, def.pattern)?,
                    message: def.message.to_string(),
                    scope: if def.scope.is_empty() {
                        RuleScope::Any
                    } else {
                        RuleScope::Categories(def.scope.to_vec())
                    },
                })
            })
            .collect::<Result<Vec<_>, ConfigurationError>>()?;
        Ok(Self { base, warnings })
    }

    /// Falls back to the general explanation.
    pub fn base_for(&self, category: ClauseCategory) -> &str {
        self.base
            .get(&category)
            .or_else(|| self.base.get(&ClauseCategory::General))
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn warnings(&self) -> &[ExplanationWarning] {
        &self.warnings
    }
}

fn term_key(term: &str) -> String {
    term.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn compile_pattern(rule: &str, pattern: &str) -> Result<Regex, ConfigurationError> {
    Regex::new(&format!("(?i){}", pattern)).map_err(|source| ConfigurationError::InvalidPattern {
        rule: rule.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}

fn parse_category(name: &str) -> Result<ClauseCategory, ConfigurationError> {
    ClauseCategory::parse(name).ok_or_else(|| ConfigurationError::UnknownCategory(name.to_string()))
}

#[derive(Debug, Clone)]
pub struct RuleTables {
    categories: Vec<CategoryPatterns>,
    risk_rules: Vec<RiskRule>,
    substitutions: SubstitutionTable,
    importance: ImportanceTable,
    explanations: ExplanationTable,
}

impl RuleTables {
    /// Compile the built-in tables.
    pub fn builtin() -> Result<Self, ConfigurationError> {
        Self::from_config(&RulesConfig::default())
    }

    /// Built-in tables, adjusted by optional overrides, ready to share.
    pub fn load(overrides: Option<&RulesConfig>) -> Result<Arc<Self>, ConfigurationError> {
        let tables = match overrides {
            Some(cfg) => Self::from_config(cfg)?,
            None => Self::builtin()?,
        };
        Ok(Arc::new(tables))
    }

    pub fn from_config(cfg: &RulesConfig) -> Result<Self, ConfigurationError> {
        let mut categories: Vec<CategoryPatterns> = Vec::new();
        let mut risk_rules: Vec<RiskRule> = Vec::new();
        let mut substitutions: Vec<(String, String)> = Vec::new();

        if !cfg.replace_builtin {
            for set in CATEGORY_KEYWORDS {
                let patterns = set
                    .patterns
                    .iter()
                    .map(|(p, w)| {
                        compile_pattern(set.category.as_str(), p).map(|regex| WeightedPattern {
                            regex,
                            weight: *w,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                categories.push(CategoryPatterns {
                    category: set.category,
                    patterns,
                });
            }
            for def in RISK_RULES {
                risk_rules.push(RiskRule {
                    id: def.id.to_string(),
                    regex: compile_pattern(def.id, def.pattern)?,
                    severity: def.severity,
                    rationale: def.rationale.to_string(),
                    scope: if def.scope.is_empty() {
                        RuleScope::Any
                    } else {
                        RuleScope::Categories(def.scope.to_vec())
                    },
                });
            }
            substitutions.extend(
                SUBSTITUTIONS
                    .iter()
                    .map(|(t, p)| (t.to_string(), p.to_string())),
            );
        }

        for custom in &cfg.category_keywords {
            let category = parse_category(&custom.category)?;
            let patterns = custom
                .patterns
                .iter()
                .map(|p| {
                    compile_pattern(&custom.category, &p.pattern).map(|regex| WeightedPattern {
                        regex,
                        weight: p.weight,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            match categories.iter_mut().find(|c| c.category == category) {
                Some(existing) => existing.patterns.extend(patterns),
                None => categories.push(CategoryPatterns { category, patterns }),
            }
        }

        for custom in &cfg.risk_rules {
            let severity = RiskLevel::parse(&custom.severity)
                .ok_or_else(|| ConfigurationError::UnknownSeverity(custom.severity.clone()))?;
            let scope = if custom.categories.is_empty() {
                RuleScope::Any
            } else {
                RuleScope::Categories(
                    custom
                        .categories
                        .iter()
                        .map(|c| parse_category(c))
                        .collect::<Result<Vec<_>, _>>()?,
                )
            };
            risk_rules.push(RiskRule {
                id: custom.id.clone(),
                regex: compile_pattern(&custom.id, &custom.pattern)?,
                severity,
                rationale: custom.rationale.clone(),
                scope,
            });
        }

        // custom terms go last so they win over built-in entries with the same key
        substitutions.extend(
            cfg.substitutions
                .iter()
                .map(|s| (s.term.clone(), s.plain.clone())),
        );

        if categories.iter().all(|c| c.patterns.is_empty()) {
            return Err(ConfigurationError::MissingRules(
                "no category keywords configured".to_string(),
            ));
        }
        if substitutions.is_empty() {
            return Err(ConfigurationError::MissingRules(
                "no plain-language substitutions configured".to_string(),
            ));
        }

        Ok(Self {
            categories,
            risk_rules,
            substitutions: SubstitutionTable::compile(substitutions)?,
            importance: ImportanceTable::compile()?,
            explanations: ExplanationTable::compile()?,
        })
    }

    pub fn categories(&self) -> &[CategoryPatterns] {
        &self.categories
    }

    pub fn risk_rules(&self) -> &[RiskRule] {
        &self.risk_rules
    }

    pub fn substitutions(&self) -> &SubstitutionTable {
        &self.substitutions
    }

    pub fn importance(&self) -> &ImportanceTable {
        &self.importance
    }

    pub fn explanations(&self) -> &ExplanationTable {
        &self.explanations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::config_store::{RiskRuleConfig, SubstitutionConfig};

    #[test]
    fn test_builtin_tables_compile() {
        let tables = RuleTables::builtin().unwrap();
        assert_eq!(tables.categories().len(), 5);
        assert!(tables.risk_rules().iter().any(|r| r.id == "unlimited_liability"));
        assert!(tables.substitutions().len() > 30);
    }

    #[test]
    fn test_every_category_has_an_explanation() {
        let tables = RuleTables::builtin().unwrap();
        for category in ClauseCategory::PRIORITY {
            let text = tables.explanations().base_for(category);
            assert!(text.ends_with('.'), "{} explanation: {:?}", category, text);
        }
        assert_ne!(
            tables.explanations().base_for(ClauseCategory::Liability),
            tables.explanations().base_for(ClauseCategory::General)
        );
    }

    #[test]
    fn test_importance_tiers_highest_first() {
        let tables = RuleTables::builtin().unwrap();
        let order: Vec<ClauseImportance> = tables.importance().tiers().iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![ClauseImportance::High, ClauseImportance::Medium]);
    }

    #[test]
    fn test_rule_ids_unique() {
        let tables = RuleTables::builtin().unwrap();
        let mut ids: Vec<&str> = tables.risk_rules().iter().map(|r| r.id.as_str()).collect();
        let before = ids.len();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), before);
    }

    #[test]
    fn test_substitution_lookup_ignores_case_and_spacing() {
        let tables = RuleTables::builtin().unwrap();
        let subs = tables.substitutions();
        assert_eq!(subs.plain_for("Prior   To"), Some("before"));
        assert_eq!(subs.plain_for("SHALL"), Some("must"));
        assert_eq!(subs.plain_for("nonexistent"), None);
    }

    #[test]
    fn test_custom_rule_appended_with_scope() {
        let cfg = RulesConfig {
            risk_rules: vec![RiskRuleConfig {
                id: "crypto_payment".to_string(),
                pattern: r"\bbitcoin\b".to_string(),
                severity: "medium".to_string(),
                rationale: "Volatile payment ({match}).".to_string(),
                categories: vec!["financial".to_string()],
            }],
            ..RulesConfig::default()
        };
        let tables = RuleTables::from_config(&cfg).unwrap();
        let last = tables.risk_rules().last().unwrap();
        assert_eq!(last.id, "crypto_payment");
        assert_eq!(last.scope, RuleScope::Categories(vec![ClauseCategory::Financial]));
        assert_eq!(last.render_rationale(" Bitcoin "), "Volatile payment (Bitcoin).");
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let cfg = RulesConfig {
            risk_rules: vec![RiskRuleConfig {
                id: "broken".to_string(),
                pattern: "(unclosed".to_string(),
                severity: "high".to_string(),
                rationale: String::new(),
                categories: vec![],
            }],
            ..RulesConfig::default()
        };
        assert!(matches!(
            RuleTables::from_config(&cfg),
            Err(ConfigurationError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_unknown_severity_and_category() {
        let mut cfg = RulesConfig::default();
        cfg.risk_rules.push(RiskRuleConfig {
            id: "x".to_string(),
            pattern: "x".to_string(),
            severity: "critical".to_string(),
            rationale: String::new(),
            categories: vec![],
        });
        assert!(matches!(
            RuleTables::from_config(&cfg),
            Err(ConfigurationError::UnknownSeverity(_))
        ));

        cfg.risk_rules[0].severity = "low".to_string();
        cfg.risk_rules[0].categories = vec!["ip".to_string()];
        assert!(matches!(
            RuleTables::from_config(&cfg),
            Err(ConfigurationError::UnknownCategory(_))
        ));
    }

    #[test]
    fn test_replace_builtin_requires_tables() {
        let cfg = RulesConfig {
            replace_builtin: true,
            substitutions: vec![SubstitutionConfig {
                term: "shall".to_string(),
                plain: "must".to_string(),
            }],
            ..RulesConfig::default()
        };
        assert!(matches!(
            RuleTables::from_config(&cfg),
            Err(ConfigurationError::MissingRules(_))
        ));
    }
}
