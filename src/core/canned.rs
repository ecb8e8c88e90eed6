//! Canned response engine
//!
//! Scripted replies for the client-side chat surfaces. An ordered table of
//! keyword rules is evaluated top to bottom and the first match wins; if
//! nothing matches, the profile's fallback reply is used.

use crate::conversation::{ConversationKind, Recipient};

/// One keyword rule. Keywords are lowercase and matched as substrings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyRule {
    pub keywords: &'static [&'static str],
    pub reply: &'static str,
}

impl ReplyRule {
    /// `lowered` must already be lowercase
    fn matches(&self, lowered: &str) -> bool {
        self.keywords.iter().any(|k| lowered.contains(k))
    }
}

/// Legal topic rules, in priority order
pub const LEGAL_TOPIC_RULES: &[ReplyRule] = &[
    ReplyRule {
        keywords: &["constitution"],
        reply: "The Constitution of Pakistan is the supreme law of Pakistan. It was adopted on 12 April 1973 and provides a parliamentary form of government with a President as head of state and a Prime Minister as head of government.",
    },
    ReplyRule {
        keywords: &["criminal", "penal"],
        reply: "The Pakistan Penal Code is the main criminal code of Pakistan. It was originally prepared by Lord Macaulay and was introduced in 1860 during the British Raj.",
    },
    ReplyRule {
        keywords: &["divorce", "marriage"],
        reply: "Family law in Pakistan is primarily governed by the Muslim Family Laws Ordinance, 1961. For divorce matters, there are specific procedures that need to be followed depending on whether it's initiated by the husband (talaq) or wife (khula).",
    },
    ReplyRule {
        keywords: &["tax"],
        reply: "Tax laws in Pakistan are primarily governed by the Income Tax Ordinance, 2001 and the Sales Tax Act, 1990. The Federal Board of Revenue (FBR) is responsible for administering these laws.",
    },
];

pub mod replies {
    pub const ASSISTANT_FALLBACK: &str = "I can provide information about Pakistani laws including constitutional law, criminal law, family law, tax law, and more. Please ask a specific legal question, and I'll do my best to assist you.";

    pub const QUICK_CHAT_FALLBACK: &str = "Thank you for your question. This is a complex legal matter that requires personalized attention. Would you like to schedule a consultation with a specialized lawyer to discuss this in detail?";

    pub const CONTACT_REQUEST: &str = "Thank you for your message. To connect you with the right legal expert, could you please provide your name, email, and phone number?";

    pub const CONTACT_ACKNOWLEDGED: &str = "Thank you for providing your contact information. A qualified lawyer will reach out to you shortly to discuss your legal matter in detail.";

    pub const DIRECT_ACKNOWLEDGEMENT: &str = "Thank you for your message. I'll look into this and get back to you soon.";

    pub const ASSISTANT_GREETING: &str = "Hello! I'm your Pakistani legal assistant. How can I help you with legal information today?";

    pub const DIRECT_GREETING: &str = "Hello, how can I help you with your legal matter today?";

    pub const DEFAULT_LAWYER_NAME: &str = "Legal Assistant";
}

/// Keyword matcher over an ordered rule table
#[derive(Debug, Clone)]
pub struct CannedEngine {
    rules: &'static [ReplyRule],
    fallback: &'static str,
}

impl CannedEngine {
    pub fn new(rules: &'static [ReplyRule], fallback: &'static str) -> Self {
        Self { rules, fallback }
    }

    /// Marketing-page assistant profile
    pub fn legal_assistant() -> Self {
        Self::new(LEGAL_TOPIC_RULES, replies::ASSISTANT_FALLBACK)
    }

    /// Per-lawyer quick chat profile
    pub fn quick_chat() -> Self {
        Self::new(LEGAL_TOPIC_RULES, replies::QUICK_CHAT_FALLBACK)
    }

    /// First rule matching `text`, case-insensitively
    pub fn matching_rule(&self, text: &str) -> Option<&'static ReplyRule> {
        let lowered = text.to_lowercase();
        self.rules.iter().find(|rule| rule.matches(&lowered))
    }

    pub fn reply(&self, text: &str) -> CannedReply {
        match self.matching_rule(text) {
            Some(rule) => CannedReply::new(rule.reply, ReplyKind::Topic),
            None => CannedReply::new(self.fallback, ReplyKind::Fallback),
        }
    }
}

/// What produced a canned reply. Also decides the simulated latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Topic,
    Fallback,
    ContactRequest,
    ContactAcknowledged,
    Acknowledgement,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CannedReply {
    pub text: &'static str,
    pub kind: ReplyKind,
}

impl CannedReply {
    fn new(text: &'static str, kind: ReplyKind) -> Self {
        Self { text, kind }
    }
}

/// True when the text looks like the caller is sharing contact details
pub fn carries_contact_details(text: &str) -> bool {
    let lowered = text.to_lowercase();
    ["@", "email", "phone", "name"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Quick chat: the first turn always asks for contact details. From the second
/// turn on, the first message carrying details is acknowledged once; everything
/// else falls through to keyword matching.
#[derive(Debug, Clone)]
pub struct QuickChatResponder {
    engine: CannedEngine,
    info_provided: bool,
    user_turns: usize,
}

impl QuickChatResponder {
    pub fn new() -> Self {
        Self {
            engine: CannedEngine::quick_chat(),
            info_provided: false,
            user_turns: 0,
        }
    }

    #[cfg(test)]
    pub fn info_provided(&self) -> bool {
        self.info_provided
    }

    pub fn respond(&mut self, text: &str) -> CannedReply {
        self.user_turns += 1;

        if self.user_turns == 1 {
            return CannedReply::new(replies::CONTACT_REQUEST, ReplyKind::ContactRequest);
        }

        if !self.info_provided && carries_contact_details(text) {
            self.info_provided = true;
            return CannedReply::new(replies::CONTACT_ACKNOWLEDGED, ReplyKind::ContactAcknowledged);
        }

        self.engine.reply(text)
    }
}

impl Default for QuickChatResponder {
    fn default() -> Self {
        Self::new()
    }
}

/// Reply policy for one conversation
#[derive(Debug, Clone)]
pub enum Responder {
    Assistant(CannedEngine),
    QuickChat(QuickChatResponder),
    Direct,
}

impl Responder {
    pub fn for_kind(kind: ConversationKind) -> Self {
        match kind {
            ConversationKind::Assistant => Responder::Assistant(CannedEngine::legal_assistant()),
            ConversationKind::QuickChat => Responder::QuickChat(QuickChatResponder::new()),
            ConversationKind::Direct => Responder::Direct,
        }
    }

    /// Opening assistant turn for a freshly mounted surface
    pub fn greeting(&self, recipient: Option<&Recipient>) -> String {
        match self {
            Responder::Assistant(_) => replies::ASSISTANT_GREETING.to_string(),
            Responder::Direct => replies::DIRECT_GREETING.to_string(),
            Responder::QuickChat(_) => {
                let name = recipient
                    .map(|r| r.display_name.trim())
                    .filter(|n| !n.is_empty())
                    .unwrap_or(replies::DEFAULT_LAWYER_NAME);

                match recipient.and_then(|r| r.specialization.as_deref()) {
                    Some(specialization) if !specialization.trim().is_empty() => format!(
                        "Hello! I'm {}, specializing in {}. How can I help you with your legal matter today?",
                        name,
                        specialization.trim()
                    ),
                    _ => format!(
                        "Hello! I'm {}. How can I help you with your legal matter today?",
                        name
                    ),
                }
            }
        }
    }

    pub fn respond(&mut self, text: &str) -> CannedReply {
        match self {
            Responder::Assistant(engine) => engine.reply(text),
            Responder::QuickChat(responder) => responder.respond(text),
            Responder::Direct => {
                CannedReply::new(replies::DIRECT_ACKNOWLEDGEMENT, ReplyKind::Acknowledgement)
            }
        }
    }
}
