//! Reply copy for every point in the dialogue.
//!
//! Kept in one place so the scripted flow reads top to bottom. The engine
//! re-sends the same clarifying prompt on invalid input, which keeps every
//! state idempotent under re-delivery.

pub const ALREADY_ENROLLED: &str = "You're already signed up! You'll get a weekly check-in text. Reply STOP anytime to opt out.";

pub const WELCOME_AND_UV: &str = "Welcome to the Cold & Flu Tracker! Quick signup (4 questions).\n\nDo you regularly spend time in a space with a far-UV lamp? Reply YES or NO";

pub const UV_REPROMPT: &str = "Please reply YES or NO - do you regularly spend time in a space with a far-UV lamp?";

pub const ASK_UV_HOURS: &str = "How many hours per week do you spend in a space with a far-UV lamp? Reply with a number (e.g. 8, 20, 40)";

pub const UV_HOURS_REPROMPT: &str = "Please reply with a number of hours per week (e.g. 8, 20, 40)";

pub const ASK_ZIP: &str = "What's your zip code?";

pub const ZIP_REPROMPT: &str = "Please reply with a 5-digit US zip code (e.g. 90210)";

pub const ASK_HOUSEHOLD: &str = "How many people regularly share your home or workspace? Reply with a number";

pub const HOUSEHOLD_REPROMPT: &str = "Please reply with a number (e.g. 1, 4, 12)";

pub const SIGNUP_DONE: &str = "You're all set! You'll get a weekly text asking how you're feeling. Reply STOP anytime to opt out. Thanks for participating!";

pub const WEEKLY_PROMPT: &str = "Hi! Quick weekly check-in: were you sick this past week? Reply YES or NO";

pub const WEEKLY_SICK_REPROMPT: &str = "Were you sick this past week? Reply YES or NO";

pub const ASK_SEVERITY: &str = "Sorry to hear that! How severe on a scale of 1-5? (1=barely noticeable, 5=knocked out)";

pub const SEVERITY_REPROMPT: &str = "Please reply with a number 1-5 (1=barely noticeable, 5=knocked out)";

pub const ASK_SYMPTOMS: &str = "What symptoms? Reply with the letters that apply:\nA) Cough\nB) Fever\nC) Congestion\nD) Sore throat\nE) Other\n\ne.g. reply AC for cough and congestion";

pub const SYMPTOMS_REPROMPT: &str = "Please reply with letters A-E for your symptoms:\nA) Cough  B) Fever  C) Congestion  D) Sore throat  E) Other";

pub const WEEKLY_DONE_HEALTHY: &str = "Glad to hear it! Talk to you next week.";

pub const WEEKLY_DONE_SICK: &str = "Got it, hope you feel better soon! Talk to you next week.";

pub const NOT_ENROLLED: &str = "You're not currently signed up. Reply SIGNUP to join!";

pub const IDLE_ACK: &str = "Thanks for your message! You'll get your weekly check-in automatically. Reply STATUS to see your info.";

pub const UNKNOWN_ACK: &str = "Hi! Reply SIGNUP to join the Cold & Flu Tracker study.";

/// Retry-safe reply the adapter sends when persistence is unavailable.
pub const TEMPORARY_FAILURE: &str = "Sorry, something went wrong on our end. Please text again in a few minutes.";

/// STATUS reply for an enrolled participant.
pub fn status_enrolled(uv_exposure: bool) -> String {
    let uv = if uv_exposure { "Yes" } else { "No" };
    format!("You're active in the study. UV exposure: {uv}. Reply STOP to opt out.")
}
