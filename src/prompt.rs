//! Card instruction template.

/// Token replaced by the subject name.
pub const NAME_PLACEHOLDER: &str = "[Name]";

/// Instruction sent alongside the photo.
pub const PROMPT_TEMPLATE: &str = "I want to create a personalized birthday card. I will provide a photo, and I would like that image to be converted into vector art and artistically edited. Using this artwork, I want a beautifully designed birthday poster/card that includes stylish graphics, birthday elements (like balloons, confetti, cake, etc.), and a heartfelt birthday message that says: \"Happy Birthday [Name]\". The overall design should feel festive, elegant, and visually appealing.";

/// Renders the instruction for `name`.
///
/// Only the first placeholder is substituted; the name is inserted verbatim.
pub fn card_prompt(name: &str) -> String {
    PROMPT_TEMPLATE.replacen(NAME_PLACEHOLDER, name, 1)
}
