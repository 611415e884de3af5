use crate::models::{
    ChangeTradeStatusRequest, DeleteOfferRequest, DeleteRequest, Feedback, FeedbackRequest, FeedbackResponse,
    FeedbackStats, FeedbackType, UpdateRequest,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::get_feedback,
        crate::routes::list_feedbacks,
        crate::routes::create_feedback,
        crate::routes::update_feedback,
        crate::routes::delete_feedback,
        crate::routes::restore_feedback,
        crate::routes::get_stats,
    ),
    components(schemas(
        Feedback, FeedbackType, FeedbackRequest, UpdateRequest, FeedbackResponse, FeedbackStats,
        DeleteRequest, DeleteOfferRequest, ChangeTradeStatusRequest
    )),
    tags(
        (name = "feedback", description = "Feedback records and per-user stats"),
    )
)]
pub struct ApiDoc;
