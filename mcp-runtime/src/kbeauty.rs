//! K-Beauty tool surface: the catalog and the templated guidance each tool returns.
//!
//! Most tools hand the host assistant a structured research brief (what to look
//! up on the web and how to present it). `recommend_routine` and
//! `skin_concern_matcher` also include a baseline answer built from static tables.

use async_trait::async_trait;
use kbeauty_core::tool::{ToolContent, ToolDescriptor};
use serde_json::{Map, Value, json};

use crate::executor::{ToolExecutionError, ToolExecutor};

const SKIN_TYPES: [&str; 5] = ["oily", "dry", "combination", "sensitive", "normal"];

struct ConcernGuide {
    key: &'static str,
    ingredients: &'static [&'static str],
    avoid: &'static str,
    routine: &'static str,
}

const CONCERN_GUIDES: [ConcernGuide; 5] = [
    ConcernGuide {
        key: "acne",
        ingredients: &["Salicylic acid (BHA)", "Niacinamide", "Centella asiatica", "Tea tree"],
        avoid: "Heavy oils, comedogenic ingredients",
        routine: "Double cleanse → BHA toner → niacinamide serum → light moisturizer",
    },
    ConcernGuide {
        key: "aging",
        ingredients: &["Retinol", "Vitamin C", "Peptides", "Hyaluronic acid"],
        avoid: "Harsh scrubs, alcohol-based toners",
        routine: "Cleanse → vitamin C (AM) → retinol (PM) → rich moisturizer",
    },
    ConcernGuide {
        key: "pigmentation",
        ingredients: &["Vitamin C", "Niacinamide", "Arbutin", "Kojic acid"],
        avoid: "Aggressive peels, fragrance",
        routine: "Cleanse → brightening serum → moisturizer → sunscreen every day",
    },
    ConcernGuide {
        key: "dryness",
        ingredients: &["Hyaluronic acid", "Ceramides", "Squalane", "Glycerin"],
        avoid: "Alcohol-based products, over-cleansing",
        routine: "Gentle cleanse → hyaluronic acid → oil or cream → sleeping mask",
    },
    ConcernGuide {
        key: "sensitivity",
        ingredients: &["Centella asiatica", "Panthenol", "Aloe", "Fragrance-free formulas"],
        avoid: "Fragrance, alcohol, strong actives",
        routine: "Mild cleanse → soothing toner → barrier cream → mineral sunscreen",
    },
];

/// The catalog served by `tools/list`.
pub fn tool_definitions() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor::new(
            "analyze_skin_from_photo",
            "Comprehensive skin analysis from an uploaded photo. Covers skin tone, pigmentation, acne, blackheads, pores, texture and ageing signs, and returns a personalised K-Beauty plan",
            json!({
                "type": "object",
                "properties": {
                    "image_description": {
                        "type": "string",
                        "description": "Additional context about the uploaded photo (lighting conditions, concerns to focus on, etc.)"
                    },
                    "analysis_focus": {
                        "type": "array",
                        "items": {
                            "type": "string",
                            "enum": ["skin_tone", "pigmentation", "acne", "blackheads", "pores", "texture", "wrinkles", "dark_circles", "overall_condition"]
                        },
                        "description": "Specific aspects to focus on during analysis"
                    },
                    "user_age": {
                        "type": "number",
                        "description": "User's age for age-appropriate recommendations"
                    },
                    "skin_type_self_assessment": {
                        "type": "string",
                        "enum": ["oily", "dry", "combination", "sensitive", "normal", "unknown"],
                        "description": "User's own assessment of their skin type"
                    }
                },
                "required": ["image_description"]
            }),
        ),
        ToolDescriptor::new(
            "search_kbeauty_brands",
            "Search for K-Beauty brands and get comprehensive brand information",
            json!({
                "type": "object",
                "properties": {
                    "brand_name": {
                        "type": "string",
                        "description": "The K-Beauty brand name to search for"
                    }
                },
                "required": ["brand_name"]
            }),
        ),
        ToolDescriptor::new(
            "recommend_routine",
            "Get personalized K-Beauty skincare routine recommendations",
            json!({
                "type": "object",
                "properties": {
                    "skin_type": {
                        "type": "string",
                        "enum": SKIN_TYPES,
                        "description": "Primary skin type"
                    },
                    "skin_concerns": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "List of skin concerns"
                    },
                    "budget": {
                        "type": "string",
                        "enum": ["budget", "mid-range", "luxury", "mixed"],
                        "description": "Budget preference"
                    }
                },
                "required": ["skin_type"]
            }),
        ),
        ToolDescriptor::new(
            "analyze_ingredients",
            "Analyze skincare ingredients and their benefits",
            json!({
                "type": "object",
                "properties": {
                    "ingredients": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "List of ingredients to analyze"
                    },
                    "skin_type": {
                        "type": "string",
                        "enum": SKIN_TYPES,
                        "description": "Skin type for compatibility assessment"
                    }
                },
                "required": ["ingredients"]
            }),
        ),
        ToolDescriptor::new(
            "product_comparison",
            "Compare K-Beauty products",
            json!({
                "type": "object",
                "properties": {
                    "products": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "List of products to compare"
                    },
                    "comparison_criteria": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Criteria for comparison (price, ingredients, effectiveness, etc.)"
                    }
                },
                "required": ["products"]
            }),
        ),
        ToolDescriptor::new(
            "kbeauty_trends",
            "Analyze current K-Beauty trends",
            json!({
                "type": "object",
                "properties": {
                    "trend_type": {
                        "type": "string",
                        "enum": ["ingredients", "brands", "products", "techniques"],
                        "description": "Type of trend analysis"
                    },
                    "time_period": {
                        "type": "string",
                        "enum": ["current", "2024", "2025", "emerging"],
                        "description": "Time period for trend analysis"
                    }
                },
                "required": ["trend_type"]
            }),
        ),
        ToolDescriptor::new(
            "seasonal_skincare_guide",
            "Get season-specific K-Beauty recommendations",
            json!({
                "type": "object",
                "properties": {
                    "season": {
                        "type": "string",
                        "enum": ["spring", "summer", "fall", "winter"],
                        "description": "Current season"
                    },
                    "climate": {
                        "type": "string",
                        "enum": ["humid", "dry", "temperate", "tropical"],
                        "description": "Local climate type"
                    },
                    "skin_type": {
                        "type": "string",
                        "enum": SKIN_TYPES,
                        "description": "Skin type"
                    }
                },
                "required": ["season", "skin_type"]
            }),
        ),
        ToolDescriptor::new(
            "dupes_finder",
            "Find affordable alternatives for expensive K-Beauty products",
            json!({
                "type": "object",
                "properties": {
                    "target_product": {
                        "type": "string",
                        "description": "Expensive product to find dupes for"
                    },
                    "max_price": {
                        "type": "number",
                        "description": "Maximum price for dupe products"
                    }
                },
                "required": ["target_product"]
            }),
        ),
        ToolDescriptor::new(
            "skin_concern_matcher",
            "Match specific skin concerns with effective K-Beauty ingredients and products",
            json!({
                "type": "object",
                "properties": {
                    "concerns": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "List of specific skin concerns"
                    },
                    "severity": {
                        "type": "string",
                        "enum": ["mild", "moderate", "severe"],
                        "description": "Severity level of concerns"
                    }
                },
                "required": ["concerns"]
            }),
        ),
    ]
}

/// Canned K-Beauty executor. Stateless; arguments are assumed schema-valid.
#[derive(Debug, Clone, Default)]
pub struct KBeautyExecutor;

impl KBeautyExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ToolExecutor for KBeautyExecutor {
    fn list_tools(&self) -> Vec<ToolDescriptor> {
        tool_definitions()
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<Vec<ToolContent>, ToolExecutionError> {
        let args = &arguments;
        let content = match name {
            "analyze_skin_from_photo" => vec![ToolContent::text(skin_photo_brief(args))],
            "search_kbeauty_brands" => vec![ToolContent::text(brand_search_brief(args))],
            "recommend_routine" => vec![ToolContent::text(routine_recommendation(args))],
            "analyze_ingredients" => vec![ToolContent::text(ingredient_brief(args))],
            "product_comparison" => vec![ToolContent::text(comparison_brief(args))],
            "kbeauty_trends" => vec![ToolContent::text(trend_brief(args))],
            "seasonal_skincare_guide" => vec![ToolContent::text(seasonal_brief(args))],
            "dupes_finder" => vec![ToolContent::text(dupes_brief(args))],
            "skin_concern_matcher" => vec![
                ToolContent::text(concern_solutions(args)),
                ToolContent::text(concern_search_brief(args)),
            ],
            other => return Err(ToolExecutionError::UnknownTool(other.to_string())),
        };
        Ok(content)
    }
}

fn arg_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn arg_str_or<'a>(args: &'a Map<String, Value>, key: &str, default: &'a str) -> &'a str {
    arg_str(args, key).unwrap_or(default)
}

fn arg_list(args: &Map<String, Value>, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn arg_number(args: &Map<String, Value>, key: &str) -> Option<f64> {
    args.get(key).and_then(Value::as_f64)
}

/// Capitalizes the first letter of every alphabetic run ("mid-range" → "Mid-Range").
fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut at_word_start = true;
    for ch in value.chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

fn search_brief(title: &str, header: &[(&str, String)], asks: &[String], closing: &str) -> String {
    let mut text = format!("🔍 **Web search request: {title}**\n\n");
    for (label, value) in header {
        text.push_str(&format!("{label}: **{value}**\n"));
    }
    text.push_str("\nPlease search the web for:\n");
    text.push_str(&numbered(asks));
    text.push_str("\n\n");
    text.push_str(closing);
    text.push('\n');
    text
}

fn skin_photo_brief(args: &Map<String, Value>) -> String {
    let focus = {
        let focus = arg_list(args, "analysis_focus");
        if focus.is_empty() {
            vec!["overall_condition".to_string()]
        } else {
            focus
        }
    };

    let mut text = String::from("📸 **Image analysis request: full skin scan**\n\n");
    if let Some(description) = arg_str(args, "image_description") {
        text.push_str(&format!("User notes: {description}\n"));
    }
    if let Some(age) = arg_number(args, "user_age") {
        text.push_str(&format!("Age: {}\n", format_number(age)));
    }
    match arg_str(args, "skin_type_self_assessment") {
        Some(skin_type) if skin_type != "unknown" => {
            text.push_str(&format!("Self-assessed skin type: {skin_type}\n"));
        }
        _ => {}
    }
    text.push_str(&format!("Analysis focus: {}\n\n", focus.join(", ")));

    text.push_str("**Analyse the uploaded photo across these areas:**\n\n");
    let sections: [(&str, &[&str]); 8] = [
        ("Skin tone", &["Undertone (cool/warm/neutral)", "Brightness level", "Evenness", "Matching foundation and concealer shades"]),
        ("Pigmentation", &["Melasma, freckles and sun spots", "Post-acne marks (PIH/PIE)", "Overall discolouration"]),
        ("Acne", &["Active breakouts and their location", "Type (whitehead/blackhead/inflamed)", "Severity", "Scarring"]),
        ("Pores", &["Size", "Congestion", "Most visible zones (T-zone, cheeks)"]),
        ("Blackheads and whiteheads", &["Distribution on nose, chin and forehead", "Sebum plugs", "Extraction need"]),
        ("Texture", &["Smoothness vs roughness", "Flaking", "Surface uniformity"]),
        ("Ageing signs", &["Fine lines and depth", "Expression vs age lines", "Loss of firmness", "Sagging"]),
        ("Other", &["Dark circles", "Puffiness", "Oil/hydration balance", "Redness or irritation"]),
    ];
    for (i, (title, checks)) in sections.iter().enumerate() {
        text.push_str(&format!("### {}. {title}\n", i + 1));
        for check in checks.iter() {
            text.push_str(&format!("- {check}\n"));
        }
        text.push('\n');
    }

    text.push_str("## 🎯 **Personalised K-Beauty plan**\n\n");
    text.push_str("- The three most urgent concerns, each with key ingredients and fast-acting products\n");
    text.push_str("- Week 1 basics, a 1-month focus and a 3-month improvement plan\n");
    text.push_str("- Korean-brand picks for cleanser, toner/essence, serum, moisturizer, sunscreen and special care\n");
    text.push_str("- Ingredients, product types and habits to avoid\n");
    text.push_str("- Whether dermatology treatments or at-home devices are worth considering\n");
    text
}

fn brand_search_brief(args: &Map<String, Value>) -> String {
    let brand = arg_str_or(args, "brand_name", "");
    search_brief(
        "K-Beauty brand information",
        &[("Brand", brand.to_string())],
        &[
            "Brand history and background".to_string(),
            "Popular products and bestsellers".to_string(),
            "Signature ingredients and features".to_string(),
            "Price range and target customers".to_string(),
            "Recent reviews and reputation".to_string(),
            "Authorised retailers".to_string(),
        ],
        "Provide comprehensive, up-to-date information about this brand.",
    )
}

fn routine_recommendation(args: &Map<String, Value>) -> String {
    let skin_type = arg_str_or(args, "skin_type", "normal");
    let concerns = arg_list(args, "skin_concerns");
    let budget = arg_str_or(args, "budget", "mixed");

    let mut text = String::from("## 🌸 Personalised K-Beauty skincare routine\n\n");
    text.push_str(&format!("**Skin type:** {}\n", title_case(skin_type)));
    if !concerns.is_empty() {
        text.push_str(&format!("**Concerns:** {}\n", concerns.join(", ")));
    }
    text.push_str(&format!("**Budget:** {}\n\n", title_case(budget)));

    text.push_str(&format!("### 🌅 Morning routine ({skin_type} skin)\n"));
    let morning: [&str; 5] = match skin_type {
        "oily" => [
            "Low-pH gel cleanser",
            "BHA toner (2-3 times a week)",
            "Niacinamide serum",
            "Lightweight gel moisturizer",
            "Non-comedogenic sunscreen SPF 50+",
        ],
        "dry" => [
            "Cream cleanser",
            "Hyaluronic acid toner",
            "Vitamin C serum",
            "Ceramide cream",
            "Moisturizing sunscreen SPF 30+",
        ],
        _ => [
            "Gentle cleanser",
            "Toner or essence",
            "Vitamin C serum",
            "Moisturizer",
            "Sunscreen SPF 30+",
        ],
    };
    let morning: Vec<String> = morning.iter().map(|step| step.to_string()).collect();
    text.push_str(&numbered(&morning));
    text.push_str("\n\n### 🌙 Evening routine\n");
    let evening: Vec<String> = [
        "Oil cleanser (double cleanse)",
        "Water-based cleanser",
        "Toner",
        "Treatment serum",
        "Eye cream",
        "Night cream",
        "Sleeping mask (2-3 times a week)",
    ]
    .iter()
    .map(|step| step.to_string())
    .collect();
    text.push_str(&numbered(&evening));
    text.push_str(&format!(
        "\n\n🔍 **For specific products that fit a '{budget}' budget, a web search can find the latest options.**"
    ));
    text
}

fn ingredient_brief(args: &Map<String, Value>) -> String {
    let ingredients = arg_list(args, "ingredients").join(", ");
    let skin_type = arg_str(args, "skin_type");
    let skin_label = skin_type.unwrap_or("all skin types");
    search_brief(
        "skincare ingredient analysis",
        &[
            ("Ingredients", ingredients),
            ("Skin type", skin_label.to_string()),
        ],
        &[
            "Benefits and effects of each ingredient".to_string(),
            "Recommended concentration and usage".to_string(),
            "Side effects and cautions".to_string(),
            "Compatibility with other ingredients".to_string(),
            format!("Suitability for {skin_label}"),
            "Recommended products containing these ingredients".to_string(),
            "Scientific studies and clinical data".to_string(),
        ],
        "Provide detailed, trustworthy information about these ingredients.",
    )
}

fn comparison_brief(args: &Map<String, Value>) -> String {
    let products = arg_list(args, "products").join(", ");
    let criteria = {
        let criteria = arg_list(args, "comparison_criteria");
        if criteria.is_empty() {
            "price, ingredients, effectiveness".to_string()
        } else {
            criteria.join(", ")
        }
    };
    search_brief(
        "K-Beauty product comparison",
        &[("Products", products), ("Criteria", criteria)],
        &[
            "Current price and where to buy".to_string(),
            "Full ingredient list and key actives".to_string(),
            "User reviews and ratings".to_string(),
            "Expert and dermatologist opinions".to_string(),
            "Pros and cons".to_string(),
            "How long results last".to_string(),
            "Alternative products".to_string(),
        ],
        "Present the analysis as a comparison table.",
    )
}

fn trend_brief(args: &Map<String, Value>) -> String {
    let trend_type = arg_str_or(args, "trend_type", "products");
    let period = arg_str_or(args, "time_period", "current");
    search_brief(
        "K-Beauty trend analysis",
        &[
            ("Trend type", trend_type.to_string()),
            ("Period", period.to_string()),
        ],
        &[
            "Latest K-Beauty innovations and launches".to_string(),
            "Trending ingredients and technologies".to_string(),
            "Fast-rising and emerging brands".to_string(),
            "Social media beauty trends (TikTok, Instagram)".to_string(),
            "Industry reports and market analysis".to_string(),
            "Seasonal trends and forecasts".to_string(),
            "Global vs domestic Korean trends".to_string(),
        ],
        "Provide a comprehensive trend analysis with concrete examples.",
    )
}

fn seasonal_brief(args: &Map<String, Value>) -> String {
    let season = arg_str_or(args, "season", "spring");
    let climate = arg_str_or(args, "climate", "temperate");
    let skin_type = arg_str_or(args, "skin_type", "normal");
    search_brief(
        "seasonal K-Beauty skincare guide",
        &[
            ("Season", season.to_string()),
            ("Climate", climate.to_string()),
            ("Skin type", skin_type.to_string()),
        ],
        &[
            format!("Key skincare points for {season}"),
            format!("Product textures suited to a {climate} climate"),
            format!("How {skin_type} skin changes with the season"),
            "Recommended K-Beauty products and brands".to_string(),
            "Ingredients and routines to avoid".to_string(),
            "Expert seasonal care tips".to_string(),
        ],
        "Tailor the guide to the season, climate and skin type together.",
    )
}

fn dupes_brief(args: &Map<String, Value>) -> String {
    let target = arg_str_or(args, "target_product", "");
    let budget = arg_number(args, "max_price")
        .map(|price| format!("${}", format_number(price)))
        .unwrap_or_else(|| "no limit".to_string());
    search_brief(
        "K-Beauty dupe finder",
        &[("Target product", target.to_string()), ("Max budget", budget)],
        &[
            "Key ingredients of the target product".to_string(),
            "Cheaper alternatives with similar ingredients".to_string(),
            "Drugstore K-Beauty options".to_string(),
            "Dupes recommended on Reddit and by beauty bloggers".to_string(),
            "Price-to-ingredient value".to_string(),
            "Review comparisons".to_string(),
            "Online stores that carry them".to_string(),
        ],
        "Provide detailed dupe recommendations with prices and retailers.",
    )
}

fn concern_solutions(args: &Map<String, Value>) -> String {
    let concerns = arg_list(args, "concerns");
    let severity = arg_str_or(args, "severity", "moderate");

    let mut text = String::from("## 🎯 K-Beauty solutions by skin concern\n\n");
    text.push_str(&format!("**Concerns:** {}\n", concerns.join(", ")));
    text.push_str(&format!("**Severity:** {severity}\n\n"));

    for concern in &concerns {
        let lowered = concern.trim().to_lowercase();
        if lowered.is_empty() {
            continue;
        }
        let Some(guide) = CONCERN_GUIDES
            .iter()
            .find(|guide| lowered.contains(guide.key) || guide.key.contains(lowered.as_str()))
        else {
            continue;
        };
        text.push_str(&format!("### {} solution:\n\n", title_case(concern)));
        text.push_str(&format!(
            "**Key ingredients:** {}\n",
            guide.ingredients.join(", ")
        ));
        text.push_str(&format!("**Avoid:** {}\n", guide.avoid));
        text.push_str(&format!("**Base routine:** {}\n\n", guide.routine));
    }
    text
}

fn concern_search_brief(args: &Map<String, Value>) -> String {
    let concerns = arg_list(args, "concerns").join(", ");
    let severity = arg_str_or(args, "severity", "moderate");
    search_brief(
        "tailored solutions for skin concerns",
        &[("Concerns", concerns), ("Severity", severity.to_string())],
        &[
            "Latest K-Beauty products that work for each concern".to_string(),
            "Dermatologist-recommended ingredients and concentrations".to_string(),
            "Step-by-step care for each concern".to_string(),
            "Before/after reviews from real users".to_string(),
            "Brand lines specialised for these concerns".to_string(),
            "Recommendations by budget".to_string(),
            "Cautions and order of application".to_string(),
        ],
        "Include concrete product names and how to use them.",
    )
}
