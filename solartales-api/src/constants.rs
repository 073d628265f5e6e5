//! Shared constants for the API layer.

/// Subjects generated for when none are configured.
pub const DEFAULT_SUBJECTS: &[&str] = &[
    "astronaut",
    "pilot",
    "farmer",
    "power_grid_operator",
    "aurora_hunter",
    "radio_operator",
];

/// Default chat limiter window.
pub const DEFAULT_CHAT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Default chat requests per window per client.
pub const DEFAULT_CHAT_RATE_LIMIT_MAX: u32 = 10;

/// Default bound on a single LLM call.
pub const DEFAULT_GENERATION_TIMEOUT_SECS: u64 = 10;

/// Default TTL for the recent-stories listing cache.
pub const DEFAULT_LISTING_CACHE_TTL_SECS: u64 = 300;

/// Default number of stories returned by the listing endpoint.
pub const DEFAULT_RECENT_LIMIT: usize = 10;

/// Largest listing page.
pub const MAX_RECENT_LIMIT: usize = 50;

/// Longest chat message accepted.
pub const MAX_CHAT_MESSAGE_CHARS: usize = 2_000;

/// Chat turns of history forwarded to the model.
pub const MAX_CHAT_HISTORY: usize = 10;

/// Header carrying the admin token.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Reply used when the chat model cannot be reached.
pub const CHAT_FALLBACK_REPLY: &str = "I'm having trouble reaching my space library right now. \
Try again in a moment, and in the meantime look up: the Sun is about 150 million kilometres away!";

/// System prompt for the chat assistant.
pub const CHAT_SYSTEM_PROMPT: &str = "You are Sunny, a friendly space-weather guide for children aged 5 to 12. \
Answer questions about the Sun, solar flares, auroras and how space weather affects people on Earth. \
Use short sentences and simple words, stay accurate, and keep answers under 120 words.";
