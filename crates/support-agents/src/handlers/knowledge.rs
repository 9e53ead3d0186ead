//! Knowledge retrieval handler and the keyword-scored reference knowledge base.

use async_trait::async_trait;
use coordination::state::{Article, Category, HandlerKind, KnowledgeResult, StateDelta, StateView};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{expect_view, Handler, HandlerContext, HandlerError, HandlerResult, NextStep};

/// Articles scoring at or below this are dropped
const MIN_RELEVANCE: f64 = 0.1;

/// Articles returned per search
const MAX_ARTICLES: usize = 3;

/// Abstraction over knowledge base backends.
///
/// Returned articles carry a relevance score; only their ordering matters
/// to the caller.
#[cfg_attr(test, mockall::automock)]
pub trait KnowledgeBase: Send + Sync {
    /// Search for articles relevant to `query`, best first
    fn search(
        &self,
        query: &str,
        category: Option<Category>,
        limit: usize,
    ) -> Result<Vec<Article>, HandlerError>;
}

/// A stored knowledge article
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeArticle {
    pub article_id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl KnowledgeArticle {
    pub fn new(article_id: &str, title: &str, content: &str, tags: &[&str]) -> Self {
        Self {
            article_id: article_id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            tags: tags.iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    /// Keyword relevance of this article to `query`, in [0, 1]
    pub fn relevance(&self, query: &str) -> f64 {
        let query = query.to_lowercase();
        let title = self.title.to_lowercase();
        let content = self.content.to_lowercase();
        let words: std::collections::BTreeSet<&str> = query
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();

        let mut score = 0.0;
        if !query.trim().is_empty() && title.contains(query.trim()) {
            score += 0.5;
        }
        let tag_matches = words
            .iter()
            .filter(|w| self.tags.iter().any(|t| t == *w))
            .count();
        score += tag_matches as f64 * 0.15;
        let content_matches = words.iter().filter(|w| content.contains(**w)).count();
        score += content_matches as f64 * 0.08;
        let title_matches = words.iter().filter(|w| title.contains(**w)).count();
        score += title_matches as f64 * 0.2;

        score.min(1.0)
    }
}

/// In-memory knowledge base scored by keyword overlap
#[derive(Debug, Clone, Default)]
pub struct InMemoryKnowledgeBase {
    articles: Vec<KnowledgeArticle>,
}

impl InMemoryKnowledgeBase {
    pub fn new(articles: Vec<KnowledgeArticle>) -> Self {
        Self { articles }
    }

    /// A small support corpus covering the common request types
    pub fn with_sample_articles() -> Self {
        Self::new(vec![
            KnowledgeArticle::new(
                "kb-login",
                "How to log in to your account",
                "Open the app and tap Log In. Enter the email you registered with and your password. \
                 If you forgot your password, tap Forgot Password to receive a reset link by email.",
                &["login", "log", "password", "account", "access"],
            ),
            KnowledgeArticle::new(
                "kb-password-reset",
                "Resetting your password",
                "Tap Forgot Password on the login screen. A reset link valid for 30 minutes is sent \
                 to your registered email. Check your spam folder if it does not arrive.",
                &["password", "reset", "login", "email"],
            ),
            KnowledgeArticle::new(
                "kb-reservation-cancel",
                "Cancelling a reservation",
                "Open My Reservations, choose the booking and tap Cancel. Cancellations made at least \
                 24 hours before the experience return the credit to your monthly quota.",
                &["reservation", "booking", "cancel", "quota"],
            ),
            KnowledgeArticle::new(
                "kb-subscription-tiers",
                "Subscription tiers and monthly quota",
                "Basic includes 4 experiences per month and Premium includes 8. Unused quota does \
                 not roll over. You can pause your subscription once per year from Settings.",
                &["subscription", "quota", "tier", "premium", "basic", "pause"],
            ),
            KnowledgeArticle::new(
                "kb-qr-code",
                "QR code not scanning at the venue",
                "Increase screen brightness and make sure the app is updated. Venue staff can also \
                 check you in with the reservation code shown under the QR code.",
                &["qr", "code", "app", "venue", "scan"],
            ),
            KnowledgeArticle::new(
                "kb-payment-method",
                "Updating your payment method",
                "Go to Settings, then Payment, and add a new card. The new card is used from the \
                 next billing cycle.",
                &["payment", "card", "billing"],
            ),
        ])
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }
}

impl KnowledgeBase for InMemoryKnowledgeBase {
    fn search(
        &self,
        query: &str,
        _category: Option<Category>,
        limit: usize,
    ) -> Result<Vec<Article>, HandlerError> {
        let mut scored: Vec<Article> = self
            .articles
            .iter()
            .map(|a| (a, a.relevance(query)))
            .filter(|(_, score)| *score > MIN_RELEVANCE)
            .map(|(a, score)| Article {
                article_id: a.article_id.clone(),
                title: a.title.clone(),
                content: a.content.clone(),
                score,
            })
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);
        Ok(scored)
    }
}

/// Retrieves articles for the latest user message; confidence is the best score
#[derive(Debug, Default, Clone, Copy)]
pub struct KnowledgeHandler;

impl KnowledgeHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for KnowledgeHandler {
    fn kind(&self) -> HandlerKind {
        HandlerKind::Knowledge
    }

    async fn run(
        &self,
        ctx: &HandlerContext<'_>,
        view: StateView<'_>,
    ) -> Result<HandlerResult, HandlerError> {
        expect_view(HandlerKind::Knowledge, &view)?;
        let query = view
            .latest_user_message()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let category = view.classification().map(|c| c.category);

        let articles = ctx
            .services
            .knowledge
            .search(&query, category, MAX_ARTICLES)?;
        let confidence = articles.iter().map(|a| a.score).fold(0.0, f64::max);
        let result = KnowledgeResult::new(articles, confidence);

        debug!(
            session_id = ctx.session_id,
            matches = result.matched_articles.len(),
            confidence = result.confidence,
            "Knowledge search complete"
        );

        let message = match result.top() {
            Some(top) => format!(
                "Found {} article(s); best match \"{}\" ({:.2})",
                result.matched_articles.len(),
                top.title,
                top.score
            ),
            None => "No relevant articles found".to_string(),
        };
        let next = if result.top().is_some() {
            NextStep::Terminate
        } else {
            NextStep::Handler(HandlerKind::Escalation)
        };
        Ok(HandlerResult::new(StateDelta::Knowledge(result))
            .with_message(message)
            .recommend(next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::{HandlerServices, InMemoryAccountDirectory};
    use coordination::state::{Classification, HandlerDelta, TicketState, Urgency};
    use std::sync::Arc;

    fn classified_state(text: &str) -> TicketState {
        let mut state = TicketState::create("s", "t", "u", "chat", text).unwrap();
        state
            .apply_delta(
                HandlerKind::Classifier,
                HandlerDelta::new(
                    0,
                    StateDelta::Classification(Classification::new(
                        Category::Technical,
                        Urgency::Low,
                        ["login"],
                        HandlerKind::Knowledge,
                    )),
                    vec![],
                ),
            )
            .unwrap();
        state
    }

    #[test]
    fn test_relevance_scoring() {
        let article = KnowledgeArticle::new(
            "a",
            "How to log in",
            "Use your email and password",
            &["login", "password"],
        );
        // whole query in title (+0.5), each word in title (+0.2 x 2)
        let score = article.relevance("log in");
        assert!((score - 0.9).abs() < 1e-9, "{score}");
        assert_eq!(article.relevance("weather forecast"), 0.0);
        assert_eq!(article.relevance("how to log in password"), 1.0);
    }

    #[test]
    fn test_search_filters_and_limits() {
        let kb = InMemoryKnowledgeBase::with_sample_articles();
        let results = kb.search("How do I reset my password?", None, 3).unwrap();
        assert!(!results.is_empty());
        assert!(results.len() <= 3);
        assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
        assert!(results.iter().all(|a| a.score > MIN_RELEVANCE));

        assert!(kb.search("zzzz qqqq", None, 3).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_handler_uses_injected_knowledge_base() {
        let mut mock = MockKnowledgeBase::new();
        mock.expect_search()
            .withf(|query, category, limit| {
                query == "How do I log in?" && *category == Some(Category::Technical) && *limit == 3
            })
            .times(1)
            .returning(|_, _, _| {
                Ok(vec![Article {
                    article_id: "kb-1".into(),
                    title: "Log in".into(),
                    content: "Tap Log In".into(),
                    score: 0.85,
                }])
            });
        let services = HandlerServices::new(
            Arc::new(mock),
            Arc::new(InMemoryAccountDirectory::default()),
        );
        let ctx = HandlerContext {
            session_id: "s",
            ticket_id: "t",
            turn: 1,
            services: &services,
        };
        let state = classified_state("How do I log in?");
        let view = state.view_for(HandlerKind::Knowledge).unwrap();

        let result = KnowledgeHandler::new().run(&ctx, view).await.unwrap();
        match result.delta {
            StateDelta::Knowledge(k) => {
                assert_eq!(k.confidence, 0.85);
                assert_eq!(k.top().unwrap().article_id, "kb-1");
            }
            other => panic!("unexpected delta {other:?}"),
        }
        assert_eq!(result.recommended_next, Some(NextStep::Terminate));
    }

    #[tokio::test]
    async fn test_handler_propagates_service_errors() {
        let mut mock = MockKnowledgeBase::new();
        mock.expect_search()
            .returning(|_, _, _| Err(HandlerError::Unavailable("index offline".into())));
        let services = HandlerServices::new(
            Arc::new(mock),
            Arc::new(InMemoryAccountDirectory::default()),
        );
        let ctx = HandlerContext {
            session_id: "s",
            ticket_id: "t",
            turn: 1,
            services: &services,
        };
        let state = classified_state("How do I log in?");
        let view = state.view_for(HandlerKind::Knowledge).unwrap();
        let err = KnowledgeHandler::new().run(&ctx, view).await.unwrap_err();
        assert_eq!(err.kind(), crate::handlers::HandlerErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_wrong_view_rejected() {
        let services = HandlerServices::reference();
        let ctx = HandlerContext {
            session_id: "s",
            ticket_id: "t",
            turn: 1,
            services: &services,
        };
        let state = classified_state("hi");
        let view = state.view_for(HandlerKind::Classifier).unwrap();
        assert!(KnowledgeHandler::new().run(&ctx, view).await.is_err());
    }
}
