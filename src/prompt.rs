use crate::models::{Persona, Product, Profile};

const DEFAULT_CATEGORY: &str = "fashion";

const QUALITY_SUFFIX: &str =
    "ultra-detailed, 8k, sharp focus, professional color grading, no text, no watermark";

/// Photography style keyed by the profile's preferred content category.
fn category_template(category: &str) -> &'static str {
    match category {
        "lifestyle" => "Candid lifestyle photograph in an everyday setting",
        "beauty" => "Close-up beauty editorial photograph with flawless skin texture",
        "travel" => "Travel campaign photograph against a scenic destination backdrop",
        "food" => "Bright cafe-culture photograph with a warm social atmosphere",
        "tech" => "Sleek tech-forward product photograph with futuristic accents",
        "athleisure" => "Dynamic athleisure campaign photograph capturing movement",
        _ => "High-end fashion editorial photograph",
    }
}

pub fn styling_clause(persona: Persona) -> &'static str {
    match persona {
        Persona::Streetwear => {
            "urban street scene with graffiti walls, golden-hour light, candid energetic streetwear attitude"
        }
        Persona::Minimalist => {
            "clean neutral studio backdrop, soft diffused light, understated minimalist aesthetic"
        }
        Persona::LuxuryClassic => {
            "elegant marble interior, warm dramatic lighting, refined timeless luxury aesthetic"
        }
        Persona::Athleisure => {
            "bright modern city park at sunrise, crisp natural light, dynamic athletic aesthetic"
        }
    }
}

/// Builds the image prompt. Output depends only on the arguments.
pub fn build_image_prompt(persona: Persona, product: &Product, profile: &Profile) -> String {
    let content_category = profile
        .preferred_category
        .as_deref()
        .map(|c| c.trim().to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());
    let template = category_template(&content_category);

    let brand = if product.brand_name.trim().is_empty() {
        String::new()
    } else {
        format!(" by {}", product.brand_name.trim())
    };
    let colorway = if product.colorways.is_empty() {
        String::new()
    } else {
        format!(" Colorway: {}.", product.colorways.join(", "))
    };

    format!(
        "{template} featuring {title} ({category}){brand}. Styling: {clause}.{colorway} {QUALITY_SUFFIX}",
        title = product.display_title(),
        category = product.category,
        clause = styling_clause(persona),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn hoodie() -> Product {
        serde_json::from_value(json!({
            "sku": "SKU-1",
            "title": "Heavyweight Logo Hoodie",
            "category": "hoodies",
            "colorways": ["#000000", "#FFFFFF"],
            "brand_name": "Demo Brand"
        }))
        .unwrap()
    }

    #[test]
    fn streetwear_hoodie_prompt() {
        let prompt = build_image_prompt(Persona::Streetwear, &hoodie(), &Profile::default());
        assert!(prompt.starts_with("High-end fashion editorial photograph"));
        assert!(prompt.contains("Heavyweight Logo Hoodie (hoodies) by Demo Brand"));
        assert!(prompt.contains("graffiti"));
        assert!(prompt.contains("#000000, #FFFFFF"));
        assert!(prompt.ends_with(QUALITY_SUFFIX));
    }

    #[test]
    fn identical_inputs_give_identical_prompts() {
        let profile = Profile { preferred_category: Some("travel".into()), ..Default::default() };
        let a = build_image_prompt(Persona::LuxuryClassic, &hoodie(), &profile);
        let b = build_image_prompt(Persona::LuxuryClassic, &hoodie(), &profile);
        assert_eq!(a, b);
        assert!(a.starts_with("Travel campaign photograph"));
    }

    #[test]
    fn unknown_category_uses_fashion_template() {
        let profile = Profile { preferred_category: Some("gardening".into()), ..Default::default() };
        let prompt = build_image_prompt(Persona::Minimalist, &hoodie(), &profile);
        assert!(prompt.starts_with("High-end fashion editorial photograph"));
    }

    #[test]
    fn missing_title_uses_brand_and_category() {
        let mut product = hoodie();
        product.title.clear();
        product.colorways.clear();
        let prompt = build_image_prompt(Persona::Athleisure, &product, &Profile::default());
        assert!(prompt.contains("featuring Demo Brand hoodies (hoodies)"));
        assert!(!prompt.contains("Colorway"));
    }
}
