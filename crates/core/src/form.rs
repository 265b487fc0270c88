//! Headless create/edit form for a post.

use thiserror::Error;

use crate::models::{Post, PostDraft};

/// Whether the form creates a record or edits an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    /// No initial values.
    Create,
    /// Pre-populated from the record with this id.
    Edit {
        /// Id of the record being edited.
        id: u64,
    },
}

/// Editable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Single-line title.
    Title,
    /// Multi-line body.
    Body,
}

impl Field {
    /// Label shown next to the input.
    pub fn label(self) -> &'static str {
        match self {
            Field::Title => "Title",
            Field::Body => "Body",
        }
    }

    /// Placeholder shown while the input is empty.
    pub fn placeholder(self) -> &'static str {
        match self {
            Field::Title => "Enter post title",
            Field::Body => "Enter post content",
        }
    }

    /// The other field.
    pub fn next(self) -> Self {
        match self {
            Field::Title => Field::Body,
            Field::Body => Field::Title,
        }
    }
}

/// Required-field violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormError {
    /// Title is empty.
    #[error("Please input the title!")]
    MissingTitle,
    /// Body is empty.
    #[error("Please input the post content!")]
    MissingBody,
}

impl FormError {
    /// Field the error belongs to.
    pub fn field(self) -> Field {
        match self {
            FormError::MissingTitle => Field::Title,
            FormError::MissingBody => Field::Body,
        }
    }
}

/// Title and body inputs with inline required-field messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostForm {
    mode: FormMode,
    title: String,
    body: String,
    user_id: Option<u64>,
    errors: Vec<FormError>,
}

impl PostForm {
    /// Empty form in create mode, or one pre-populated from `initial`.
    pub fn new(initial: Option<&Post>) -> Self {
        let mut form = Self {
            mode: FormMode::Create,
            title: String::new(),
            body: String::new(),
            user_id: None,
            errors: Vec::new(),
        };
        form.reset(initial);
        form
    }

    /// Re-derive every field from `initial` and clear messages.
    pub fn reset(&mut self, initial: Option<&Post>) {
        match initial {
            Some(post) => {
                self.mode = FormMode::Edit { id: post.id };
                self.title = post.title.clone();
                self.body = post.body.clone();
                self.user_id = post.user_id;
            }
            None => {
                self.mode = FormMode::Create;
                self.title.clear();
                self.body.clear();
                self.user_id = None;
            }
        }
        self.errors.clear();
    }

    /// Current mode.
    pub fn mode(&self) -> FormMode {
        self.mode
    }

    /// Modal title.
    pub fn heading(&self) -> &'static str {
        match self.mode {
            FormMode::Create => "Create Post",
            FormMode::Edit { .. } => "Edit Post",
        }
    }

    /// Submit button label.
    pub fn submit_label(&self) -> &'static str {
        match self.mode {
            FormMode::Create => "Create",
            FormMode::Edit { .. } => "Update",
        }
    }

    /// Current value of `field`.
    pub fn value(&self, field: Field) -> &str {
        match field {
            Field::Title => &self.title,
            Field::Body => &self.body,
        }
    }

    /// Replace the value of `field`.
    ///
    /// A message already shown for the field is re-checked so it disappears
    /// as soon as the input is filled in.
    pub fn set_value(&mut self, field: Field, value: String) {
        match field {
            Field::Title => self.title = value,
            Field::Body => self.body = value,
        }
        if self.error_for(field).is_some() {
            let current = self.validate();
            self.errors.retain(|err| err.field() != field || current.contains(err));
        }
    }

    /// Message currently shown for `field`.
    pub fn error_for(&self, field: Field) -> Option<FormError> {
        self.errors.iter().copied().find(|err| err.field() == field)
    }

    /// Violations for the current values, without recording them.
    pub fn validate(&self) -> Vec<FormError> {
        let mut errors = Vec::new();
        if self.title.is_empty() {
            errors.push(FormError::MissingTitle);
        }
        if self.body.is_empty() {
            errors.push(FormError::MissingBody);
        }
        errors
    }

    /// Accept the values, or record and return the violations.
    pub fn submit(&mut self) -> Result<PostDraft, Vec<FormError>> {
        let errors = self.validate();
        if !errors.is_empty() {
            self.errors = errors.clone();
            return Err(errors);
        }
        self.errors.clear();
        Ok(PostDraft {
            title: self.title.clone(),
            body: self.body.clone(),
            user_id: self.user_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn existing() -> Post {
        Post {
            id: 5,
            title: "Existing".to_string(),
            body: "Some text".to_string(),
            user_id: Some(2),
            deleted: None,
            is_new: None,
        }
    }

    #[test]
    fn create_mode_requires_both_fields() {
        let mut form = PostForm::new(None);
        assert_eq!(form.mode(), FormMode::Create);
        assert_eq!(form.submit_label(), "Create");

        let errors = form.submit().unwrap_err();
        assert_eq!(errors, vec![FormError::MissingTitle, FormError::MissingBody]);
        assert_eq!(
            form.error_for(Field::Title).map(|err| err.to_string()).as_deref(),
            Some("Please input the title!")
        );

        form.set_value(Field::Title, "Hello".to_string());
        assert!(form.error_for(Field::Title).is_none());
        assert_eq!(form.error_for(Field::Body), Some(FormError::MissingBody));
        assert_eq!(form.submit().unwrap_err(), vec![FormError::MissingBody]);

        form.set_value(Field::Body, "World".to_string());
        let draft = form.submit().unwrap();
        assert_eq!(draft.title, "Hello");
        assert_eq!(draft.body, "World");
        assert_eq!(draft.user_id, None);
    }

    #[test]
    fn edit_mode_prefills_and_keeps_author() {
        let mut form = PostForm::new(Some(&existing()));
        assert_eq!(form.mode(), FormMode::Edit { id: 5 });
        assert_eq!(form.heading(), "Edit Post");
        assert_eq!(form.value(Field::Body), "Some text");

        form.set_value(Field::Body, String::new());
        assert!(form.submit().is_err());

        form.set_value(Field::Body, "Rewritten".to_string());
        let draft = form.submit().unwrap();
        assert_eq!(draft.body, "Rewritten");
        assert_eq!(draft.user_id, Some(2));
    }

    #[test]
    fn reset_rederives_from_initial_values() {
        let mut form = PostForm::new(Some(&existing()));
        form.set_value(Field::Title, String::new());
        let _ = form.submit();
        assert!(form.error_for(Field::Title).is_some());

        form.reset(None);
        assert_eq!(form.mode(), FormMode::Create);
        assert_eq!(form.value(Field::Title), "");
        assert!(form.error_for(Field::Title).is_none());

        form.reset(Some(&existing()));
        assert_eq!(form.value(Field::Title), "Existing");
    }

    #[test]
    fn whitespace_counts_as_content() {
        let mut form = PostForm::new(None);
        form.set_value(Field::Title, " ".to_string());
        form.set_value(Field::Body, "\n".to_string());
        assert!(form.submit().is_ok());
    }
}
