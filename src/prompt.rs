//! Prompt tables and prompt construction for the image provider.
//!
//! Nothing here touches the grid or gesture code; the tables only shape the
//! text sent to an [`ImageProvider`](crate::provider::ImageProvider).

use rand::seq::SliceRandom;
use rand::Rng;

pub const DEFAULT_STYLE: &str = "cute";

pub struct Style {
    pub id: &'static str,
    pub label: &'static str,
    pub instruction: &'static str,
}

pub const STYLES: &[Style] = &[
    Style {
        id: "cute",
        label: "Cute",
        instruction: "Create a cute, simple, vibrant, vector-style illustration. Use flat, distinct, prominent colors. Do not use gradients or complex textures. The style should be suitable for a children's pixel art coloring book.",
    },
    Style {
        id: "anime",
        label: "Anime",
        instruction: "Create an anime style illustration. Use vibrant colors, distinct cell shading, expressive eyes, and dynamic compositions. Keep details clear and distinct for pixelation.",
    },
    Style {
        id: "abstract",
        label: "Abstract",
        instruction: "Create an abstract, geometric, cubist style art piece. Use bold shapes, patterns, and strong contrasting colors. Focus on the composition of forms.",
    },
    Style {
        id: "pixel",
        label: "Pixel",
        instruction: "Create an 8-bit pixel art style illustration. Use a retro game aesthetic with chunky, clear pixels and a limited but vibrant color palette.",
    },
    Style {
        id: "cartoon",
        label: "Cartoon",
        instruction: "Create a classic cartoon style illustration. Use thick bold outlines, flat bright colors, and expressive features. Avoid gradients or realistic shading.",
    },
];

pub fn style(id: &str) -> Option<&'static Style> {
    STYLES.iter().find(|s| s.id == id)
}

/// Unknown styles use the default style's instruction.
pub fn style_instruction(id: &str) -> &'static str {
    style(id)
        .or_else(|| style(DEFAULT_STYLE))
        .map_or("", |s| s.instruction)
}

/// Full text sent to the provider.
pub fn construct_generation_prompt(subject: &str, style_id: &str, modifiers: Option<&str>) -> String {
    let mut lines = vec![style_instruction(style_id).to_string(), format!("Subject: {}.", subject)];
    if let Some(m) = modifiers.filter(|m| !m.trim().is_empty()) {
        lines.push(format!("ADJUSTMENTS: {}.", m));
    }
    lines.extend(
        [
            "The subject should fill the main part of the frame.",
            "IMPORTANT: Do NOT use a white background. Fill the background with a simple, colorful environment natural to the subject.",
            "The image should be completely filled with color.",
            "Only use white for small details like eyes or teeth.",
        ]
        .map(String::from),
    );
    lines.join("\n")
}

// ============================================================================
// CATEGORIES
// ============================================================================

pub struct CategoryItem {
    pub label: &'static str,
    pub prompt: &'static str,
}

pub struct Category {
    pub id: &'static str,
    pub label: &'static str,
    pub items: &'static [CategoryItem],
    /// Cheers shown when a preview arrives.
    pub exclamations: &'static [&'static str],
}

const fn item(label: &'static str, prompt: &'static str) -> CategoryItem {
    CategoryItem { label, prompt }
}

pub const CATEGORIES: &[Category] = &[
    Category {
        id: "animals",
        label: "Animals",
        items: &[
            item("Lion", "lion"),
            item("Dino", "dinosaur"),
            item("Cat", "cat"),
            item("Dog", "puppy"),
            item("Butterfly", "butterfly"),
            item("Turtle", "turtle"),
            item("Bunny", "cute bunny rabbit"),
            item("Bear", "teddy bear"),
            item("Elephant", "baby elephant"),
            item("Monkey", "playful monkey"),
            item("Penguin", "cute penguin"),
            item("Giraffe", "tall giraffe"),
        ],
        exclamations: &["Wild!", "Roar!", "Cute!", "Adorable!"],
    },
    Category {
        id: "fantasy",
        label: "Fantasy",
        items: &[
            item("Unicorn", "magical unicorn"),
            item("Dragon", "friendly dragon"),
            item("Fairy", "magical fairy"),
            item("Mermaid", "cute mermaid under water"),
            item("Wizard", "friendly wizard casting a spell"),
            item("Castle", "fairy tale castle"),
            item("Elf", "forest elf"),
            item("Phoenix", "fire phoenix bird"),
            item("Genie", "magical genie"),
        ],
        exclamations: &["Magical!", "Sparkly!", "Amazing!", "Mystical!"],
    },
    Category {
        id: "space",
        label: "Space",
        items: &[
            item("Astronaut", "astronaut spaceman"),
            item("Rocket", "space rocket ship"),
            item("Alien", "cute friendly alien"),
            item("Planet", "saturn planet in space"),
            item("Robot", "cool robot"),
            item("UFO", "flying saucer spaceship"),
            item("Moon", "crescent moon and stars"),
            item("Earth", "planet earth from space"),
            item("Star", "shining star"),
        ],
        exclamations: &["Cosmic!", "Blast off!", "Stellar!", "Far out!"],
    },
    Category {
        id: "vehicles",
        label: "Vehicles",
        items: &[
            item("Race Car", "race car"),
            item("Police Car", "police car"),
            item("Train", "steam train"),
            item("Boat", "sailboat"),
            item("Plane", "flying airplane"),
            item("Truck", "delivery truck"),
            item("Bus", "school bus"),
            item("Helicopter", "helicopter"),
            item("Tractor", "farm tractor"),
        ],
        exclamations: &["Zoom!", "Vroom!", "Fast!", "Speedy!"],
    },
    Category {
        id: "food",
        label: "Yummy",
        items: &[
            item("Ice Cream", "ice cream cone"),
            item("Pizza", "pizza slice"),
            item("Cupcake", "cupcake"),
            item("Fruit", "fruit basket"),
            item("Burger", "cheeseburger"),
            item("Donut", "donut"),
            item("Cookie", "chocolate chip cookie"),
            item("Taco", "taco"),
            item("Sushi", "sushi roll"),
        ],
        exclamations: &["Yummy!", "Delicious!", "Tasty!", "Sweet!"],
    },
    Category {
        id: "sports",
        label: "Sports",
        items: &[
            item("Soccer", "soccer ball"),
            item("Basketball", "basketball"),
            item("Tennis", "tennis racket and ball"),
            item("Baseball", "baseball bat and ball"),
            item("Football", "american football"),
            item("Volleyball", "volleyball"),
            item("Golf", "golf club and ball"),
            item("Hockey", "ice hockey stick and puck"),
            item("Skating", "skateboard"),
        ],
        exclamations: &["Score!", "Goal!", "Exciting!", "Victory!"],
    },
    Category {
        id: "nature",
        label: "Nature",
        items: &[
            item("Beach", "sunny beach with palm trees"),
            item("Mountain", "snowy mountain peak"),
            item("Forest", "path in a green forest"),
            item("Desert", "desert landscape with cactus"),
            item("Rainbow", "bright rainbow over hills"),
            item("Flowers", "field of sunflowers"),
            item("Tree", "big oak tree"),
            item("Sun", "smiling sun in the sky"),
            item("Snowman", "snowman in winter"),
        ],
        exclamations: &["Scenic!", "Beautiful!", "Fresh!", "Inspiring!"],
    },
];

const DEFAULT_EXCLAMATIONS: &[&str] = &["Wow!", "Beautiful!", "Super!", "Nice!"];

pub fn category(id: &str) -> Option<&'static Category> {
    CATEGORIES.iter().find(|c| c.id == id)
}

pub const CHARACTERS: &[&str] = &[
    "cute puppy",
    "happy kitten",
    "friendly bear",
    "little boy",
    "little girl",
    "baby dragon",
    "tiny robot",
    "cheerful bunny",
    "playful monkey",
    "baby dinosaur",
    "friendly tiger",
    "cute elephant",
];

/// Item labels that already name a character.
const CHARACTER_LABELS: &[&str] = &[
    "Unicorn", "Dragon", "Robot", "Alien", "Fairy", "Wizard", "Mermaid", "Astronaut", "Elf", "Genie", "Phoenix",
    "Snowman",
];

/// Subject text for a category pick. Half the time (when extras are allowed
/// and the pick is not already a character) a random character joins the
/// scene; otherwise the subject gets an indefinite article.
pub fn smart_prompt<R: Rng + ?Sized>(
    category_id: &str,
    label: &str,
    base_prompt: &str,
    allow_extras: bool,
    rng: &mut R,
) -> String {
    let character = CHARACTERS.choose(rng).copied().unwrap_or("cute puppy");
    let is_character = category_id == "animals" || CHARACTER_LABELS.contains(&label);

    if allow_extras && !is_character && rng.gen_bool(0.5) {
        return match category_id {
            "vehicles" => format!("A {} riding in a {}", character, base_prompt),
            "food" => format!("A {} eating a delicious {}", character, base_prompt),
            "nature" | "space" => format!("A {} exploring a {}", character, base_prompt),
            "sports" => format!("A {} playing with a {}", character, base_prompt),
            _ if label == "Castle" => format!("A {} visiting a {}", character, base_prompt),
            _ => format!("A {} with a {}", character, base_prompt),
        };
    }

    with_article(base_prompt)
}

/// "A cat" / "An elephant".
pub fn with_article(subject: &str) -> String {
    let starts_with_vowel = subject
        .chars()
        .next()
        .is_some_and(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'));
    format!("{} {}", if starts_with_vowel { "An" } else { "A" }, subject)
}

pub fn success_title<R: Rng + ?Sized>(category_id: Option<&str>, rng: &mut R) -> &'static str {
    let list = category_id
        .and_then(category)
        .map_or(DEFAULT_EXCLAMATIONS, |c| c.exclamations);
    list.choose(rng).copied().unwrap_or("Wow!")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn prompt_includes_adjustments_only_when_present() {
        let with = construct_generation_prompt("A lion", "pixel", Some("active pose"));
        assert!(with.starts_with("Create an 8-bit pixel art"));
        assert!(with.contains("Subject: A lion."));
        assert!(with.contains("ADJUSTMENTS: active pose."));

        let without = construct_generation_prompt("A lion", "pixel", Some(""));
        assert!(!without.contains("ADJUSTMENTS"));
    }

    #[test]
    fn unknown_style_uses_default_instruction() {
        assert_eq!(style_instruction("oil-painting"), style_instruction("cute"));
    }

    #[test]
    fn characters_never_join_character_picks() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            assert_eq!(smart_prompt("animals", "Cat", "cat", true, &mut rng), "A cat");
            assert_eq!(smart_prompt("space", "Robot", "cool robot", true, &mut rng), "A cool robot");
        }
    }

    #[test]
    fn blocked_extras_keep_plain_subject() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            assert_eq!(smart_prompt("vehicles", "Plane", "airplane", false, &mut rng), "An airplane");
        }
    }

    #[test]
    fn allowed_extras_sometimes_add_a_character() {
        let mut rng = StdRng::seed_from_u64(5);
        let prompts: Vec<String> = (0..64)
            .map(|_| smart_prompt("vehicles", "Bus", "school bus", true, &mut rng))
            .collect();
        assert!(prompts.iter().any(|p| p == "A school bus"));
        assert!(prompts.iter().any(|p| p.ends_with("riding in a school bus")));
    }

    #[test]
    fn every_category_has_items_and_cheers() {
        for c in CATEGORIES {
            assert!(!c.items.is_empty(), "{}", c.id);
            assert!(!c.exclamations.is_empty(), "{}", c.id);
        }
        let mut rng = StdRng::seed_from_u64(1);
        assert!(category("food").unwrap().exclamations.contains(&success_title(Some("food"), &mut rng)));
    }
}
