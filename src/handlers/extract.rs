use axum::extract::{FromRequest, FromRequestParts};

use crate::error::AppError;

/// `axum::Form` whose rejection is an [`AppError`], so bad forms get a JSON body
#[derive(FromRequest)]
#[from_request(via(axum::Form), rejection(AppError))]
pub struct AppForm<T>(pub T);

/// `axum::extract::Path` with an [`AppError`] rejection
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct AppPath<T>(pub T);
