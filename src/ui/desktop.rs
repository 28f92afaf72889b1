use iced::widget::{button, column, pick_list, row, text, text_input, Container, Scrollable};
use iced::{executor, Alignment, Application, Color, Command, Element, Length, Settings, Theme};

use crate::models::Sex;

use super::{ApiClient, PredictForm, Submission};

#[derive(Debug, Clone)]
pub enum Field {
    Age,
    LengthOfStay,
    Hemoglobin,
    Glucose,
    Creatinine,
    Wbc,
    Platelets,
}

#[derive(Debug, Clone)]
pub enum Message {
    SexSelected(Sex),
    FieldChanged(Field, String),
    Submit,
    Submitted(Submission),
}

pub struct ReadmitApp {
    client: ApiClient,
    form: PredictForm,
    pending: bool,
    last: Option<Submission>,
}

/// Opens the form window and blocks until it is closed.
pub fn run(client: ApiClient) -> iced::Result {
    ReadmitApp::run(Settings::with_flags(client))
}

impl Application for ReadmitApp {
    type Executor = executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApiClient;

    fn new(client: Self::Flags) -> (Self, Command<Self::Message>) {
        (
            Self {
                client,
                form: PredictForm::default(),
                pending: false,
                last: None,
            },
            Command::none(),
        )
    }

    fn title(&self) -> String {
        "Readmission Risk Predictor".to_string()
    }

    fn update(&mut self, message: Self::Message) -> Command<Self::Message> {
        match message {
            Message::SexSelected(sex) => {
                self.form.sex = sex;
                Command::none()
            }
            Message::FieldChanged(field, value) => {
                let slot = match field {
                    Field::Age => &mut self.form.age,
                    Field::LengthOfStay => &mut self.form.length_of_stay_days,
                    Field::Hemoglobin => &mut self.form.avg_hemo,
                    Field::Glucose => &mut self.form.avg_glucose,
                    Field::Creatinine => &mut self.form.avg_creatinine,
                    Field::Wbc => &mut self.form.avg_wbc,
                    Field::Platelets => &mut self.form.avg_platelets,
                };
                *slot = value;
                Command::none()
            }
            Message::Submit => {
                self.pending = true;
                let client = self.client.clone();
                let form = self.form.clone();
                Command::perform(
                    async move { form.submit(&client).await },
                    Message::Submitted,
                )
            }
            Message::Submitted(submission) => {
                self.pending = false;
                self.last = Some(submission);
                Command::none()
            }
        }
    }

    fn view(&self) -> Element<'_, Self::Message> {
        let header = column![
            text("Readmission Risk Predictor").size(28),
            text("Enter encounter details and get an estimated 30-day readmission probability.")
                .size(16),
        ]
        .spacing(8);

        let demographics = column![
            labeled(
                "Sex",
                pick_list(Sex::ALL.to_vec(), Some(self.form.sex), Message::SexSelected).into()
            ),
            self.field("Age", Field::Age, &self.form.age),
            self.field(
                "Length of stay (days)",
                Field::LengthOfStay,
                &self.form.length_of_stay_days
            ),
        ]
        .spacing(10);

        let labs = column![
            self.field("Avg Hemoglobin", Field::Hemoglobin, &self.form.avg_hemo),
            self.field("Avg Glucose", Field::Glucose, &self.form.avg_glucose),
            self.field("Avg Creatinine", Field::Creatinine, &self.form.avg_creatinine),
            self.field("Avg WBC", Field::Wbc, &self.form.avg_wbc),
            self.field("Avg Platelets", Field::Platelets, &self.form.avg_platelets),
        ]
        .spacing(10);

        let submit = if self.pending {
            button("Predicting...")
        } else {
            button("Predict").on_press(Message::Submit)
        };

        Container::new(Scrollable::new(
            column![
                header,
                row![demographics, labs].spacing(30),
                submit,
                self.view_result()
            ]
            .spacing(20),
        ))
        .width(Length::Fill)
        .height(Length::Fill)
        .padding(20)
        .into()
    }
}

fn labeled<'a>(label: &'a str, input: Element<'a, Message>) -> Element<'a, Message> {
    row![text(label).width(Length::Fixed(180.0)), input]
        .spacing(10)
        .align_items(Alignment::Center)
        .into()
}

impl ReadmitApp {
    fn field<'a>(&'a self, label: &'a str, field: Field, value: &'a str) -> Element<'a, Message> {
        labeled(
            label,
            text_input(label, value)
                .on_input(move |v| Message::FieldChanged(field.clone(), v))
                .width(Length::Fixed(140.0))
                .into(),
        )
    }

    fn view_result(&self) -> Element<'_, Message> {
        let Some(submission) = &self.last else {
            return column![].into();
        };
        let color = match submission {
            Submission::Scored { .. } if submission.is_high_risk() => Color::from_rgb(0.8, 0.2, 0.2),
            Submission::Scored { .. } => Color::from_rgb(0.2, 0.6, 0.3),
            _ => Color::from_rgb(0.8, 0.4, 0.1),
        };

        let mut body = column![
            text(submission.headline()).size(22),
            text(submission.detail()).size(18).style(color),
        ]
        .spacing(10);
        if let Submission::Scored { payload, .. } = submission {
            if let Ok(json) = serde_json::to_string_pretty(payload) {
                body = body.push(text(json).size(14));
            }
        }
        body.into()
    }
}
