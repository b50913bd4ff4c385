use std::sync::Arc;

use crate::error::Error;
use crate::repositories::UserRepository;
use crate::user::{CreateUser, UpdateUser, User, UserId};
use crate::validation::{validate_phone, validate_user_id};

/// Validating front for the user-store collaborator. Ordinary
/// single-store persistence; the session lifecycle only consumes the
/// directory side of the same repository.
pub struct UserService<R: UserRepository> {
    repository: Arc<R>,
}

impl<R: UserRepository> UserService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub async fn create_user(&self, request: &CreateUser) -> Result<UserId, Error> {
        let new_user = request.validate()?;
        let id = self.repository.create(new_user).await?;
        tracing::debug!(user_id = %id, "user created");
        Ok(id)
    }

    pub async fn get_user(&self, id: &str) -> Result<User, Error> {
        let id = validate_user_id(id)?;
        self.repository.find_by_id(&id).await
    }

    pub async fn get_user_by_phone(&self, phone: &str) -> Result<User, Error> {
        let phone = validate_phone(phone)?;
        self.repository.find_by_phone(&phone).await
    }

    pub async fn update_user(&self, request: &UpdateUser) -> Result<(), Error> {
        let changes = request.validate()?;
        self.repository.update(changes).await
    }

    pub async fn delete_user(&self, id: &str) -> Result<(), Error> {
        let id = validate_user_id(id)?;
        self.repository.delete(&id).await
    }
}
