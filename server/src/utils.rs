pub const PLAYER_COLORS: [&str; 6] = ["red", "blue", "green", "yellow", "purple", "orange"];

// Pick the first palette color no one at the table is using
pub fn generate_color<'a>(taken: impl IntoIterator<Item = &'a str>) -> String {
    let taken: Vec<&str> = taken.into_iter().collect();
    PLAYER_COLORS
        .iter()
        .find(|c| !taken.contains(*c))
        .unwrap_or(&PLAYER_COLORS[taken.len() % PLAYER_COLORS.len()])
        .to_string()
}

// Trim a display name and cap its length
pub fn sanitize_name(name: &str) -> String {
    let trimmed: String = name.trim().chars().take(24).collect();
    if trimmed.is_empty() {
        "Player".to_string()
    } else {
        trimmed
    }
}
