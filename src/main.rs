mod ai_helper;
mod catalog;
mod quiz;

use std::sync::Arc;

use ai_helper::{format_explanation_html, FlagHelper};
use catalog::{flag_url, Catalog, Country, FlagSize};
use chatgpt::{client::ChatGPT, config::ChatGPTEngine};
use dotenv::dotenv;
use quiz::{Advance, QuizMachine, QuizPhase, Selection};
use teloxide::{
    dispatching::dialogue::InMemStorage,
    prelude::*,
    types::{ChatAction, InputFile, KeyboardButton, KeyboardMarkup, KeyboardRemove, ParseMode},
    utils::html,
};
use url::Url;

type BotDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(Clone, Default)]
pub enum State {
    #[default]
    Start,
    ReceiveModeChoice,
    Browsing,
    FlagQuiz {
        machine: QuizMachine,
    },
}

#[tokio::main]
async fn main() {
    dotenv().expect("Failed to load .env file");
    let api_key = std::env::var("CHATGPT_API_KEY").expect("CHATGPT_API_KEY is not set");

    pretty_env_logger::init();
    log::info!("Starting flag explorer bot...");

    let bot = Bot::from_env();

    let catalog = Arc::new(Catalog::new());
    log::info!("Flag catalog loaded: {} countries", catalog.countries.len());

    let gpt = {
        let mut gpt = ChatGPT::new(api_key).expect("Unable to connect with ChatGPT");

        gpt.config.engine = ChatGPTEngine::Gpt35Turbo;
        gpt.config.timeout = std::time::Duration::from_secs(15);

        gpt
    };

    let flag_helper = Arc::new(FlagHelper::new(gpt));

    let catalog_for_menu = catalog.clone();
    let helper_for_menu = flag_helper.clone();
    let catalog_for_browse = catalog.clone();
    let helper_for_browse = flag_helper.clone();
    let helper_for_quiz = flag_helper.clone();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, InMemStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceiveModeChoice].endpoint(
                move |bot: Bot, dialogue: BotDialogue, msg: Message| {
                    receive_mode_choice(
                        catalog_for_menu.clone(),
                        helper_for_menu.clone(),
                        bot,
                        dialogue,
                        msg,
                    )
                },
            ))
            .branch(dptree::case![State::Browsing].endpoint(
                move |bot: Bot, dialogue: BotDialogue, msg: Message| {
                    browse(
                        catalog_for_browse.clone(),
                        helper_for_browse.clone(),
                        bot,
                        dialogue,
                        msg,
                    )
                },
            ))
            .branch(dptree::case![State::FlagQuiz { machine }].endpoint(
                move |bot: Bot, dialogue: BotDialogue, machine: QuizMachine, msg: Message| {
                    flag_quiz(helper_for_quiz.clone(), bot, dialogue, machine, msg)
                },
            )),
    )
    .dependencies(dptree::deps![InMemStorage::<State>::new()])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const GREETING_TEXT: &str = "Hi! I'm the flag explorer bot. I can tell you what the world's \
flags mean, and quiz you on them. What would you like to do?";

const BROWSE_MODE: &str = "Explore flags";
const QUIZ_MODE: &str = "Start the flag quiz";
const BACK_TO_MENU: &str = "Back to menu";
const NEXT_QUESTION: &str = "Next question";
const FINISH_QUIZ: &str = "Finish quiz";
const PLAY_AGAIN: &str = "Play again";

fn menu_keyboard() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![vec![
        KeyboardButton::new(BROWSE_MODE),
        KeyboardButton::new(QUIZ_MODE),
    ]])
    .resize_keyboard(true)
}

async fn start(bot: Bot, dialogue: BotDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT)
        .reply_markup(menu_keyboard())
        .await?;

    dialogue.update(State::ReceiveModeChoice).await?;
    Ok(())
}

async fn receive_mode_choice(
    catalog: Arc<Catalog>,
    helper: Arc<FlagHelper>,
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
) -> HandlerResult {
    match msg.text() {
        Some(BROWSE_MODE) => {
            let keyboard = KeyboardMarkup::new(vec![vec![KeyboardButton::new(BACK_TO_MENU)]])
                .resize_keyboard(true);
            bot.send_message(
                msg.chat.id,
                "Type a country name (or part of one) and I'll look it up.",
            )
            .reply_markup(keyboard)
            .await?;

            dialogue.update(State::Browsing).await?;
            Ok(())
        }
        Some(QUIZ_MODE) => start_quiz(catalog, helper, bot, dialogue, msg.chat.id).await,
        _ => {
            bot.send_message(msg.chat.id, "Please choose one of the options")
                .reply_markup(menu_keyboard())
                .await?;
            Ok(())
        }
    }
}

async fn start_quiz(
    catalog: Arc<Catalog>,
    helper: Arc<FlagHelper>,
    bot: Bot,
    dialogue: BotDialogue,
    chat_id: ChatId,
) -> HandlerResult {
    let mut machine = QuizMachine::new();
    machine.start();

    bot.send_message(chat_id, "Generating your quiz...")
        .reply_markup(KeyboardRemove::new())
        .await?;
    // Best effort, the quiz works without the typing indicator too
    let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;

    match helper.generate_quiz(&catalog).await {
        Ok(questions) => {
            machine.questions_ready(questions);
            send_current_question(&bot, chat_id, &machine).await?;
            dialogue.update(State::FlagQuiz { machine }).await?;
        }
        Err(err) => {
            log::warn!("Quiz generation failed: {}", err);
            machine.generation_failed(err.to_string());
            let reason = machine.error().unwrap_or("unknown error").to_string();
            bot.send_message(
                chat_id,
                format!("Failed to generate the quiz, please try again.\n({})", reason),
            )
            .reply_markup(menu_keyboard())
            .await?;
            dialogue.update(State::ReceiveModeChoice).await?;
        }
    }
    Ok(())
}

async fn send_current_question(bot: &Bot, chat_id: ChatId, machine: &QuizMachine) -> HandlerResult {
    let question = machine
        .current_question()
        .ok_or("quiz has no current question")?;

    let keyboard = KeyboardMarkup::new(
        question
            .options
            .chunks(2)
            .map(|pair| {
                pair.iter()
                    .map(|option| KeyboardButton::new(option.clone()))
                    .collect()
            })
            .collect::<Vec<Vec<KeyboardButton>>>(),
    )
    .resize_keyboard(true);

    let flag = InputFile::url(Url::parse(&flag_url(&question.country_code, FlagSize::Quiz))?);
    bot.send_photo(chat_id, flag)
        .caption(format!(
            "Question {} of {}:\nWhich country does this flag belong to?",
            machine.question_number(),
            machine.total()
        ))
        .reply_markup(keyboard)
        .await?;
    Ok(())
}

async fn flag_quiz(
    helper: Arc<FlagHelper>,
    bot: Bot,
    dialogue: BotDialogue,
    mut machine: QuizMachine,
    msg: Message,
) -> HandlerResult {
    let text = match msg.text() {
        Some(text) => text,
        None => {
            bot.send_message(msg.chat.id, "Please answer with one of the options")
                .await?;
            return Ok(());
        }
    };

    // The finished screen stays up until the user explicitly restarts.
    if machine.phase() == QuizPhase::Finished {
        if text == PLAY_AGAIN {
            machine.restart();
            bot.send_message(msg.chat.id, "What would you like to do?")
                .reply_markup(menu_keyboard())
                .await?;
            dialogue.update(State::ReceiveModeChoice).await?;
        } else {
            let keyboard = KeyboardMarkup::new(vec![vec![KeyboardButton::new(PLAY_AGAIN)]])
                .resize_keyboard(true);
            bot.send_message(
                msg.chat.id,
                format!("The quiz is over. Press \"{}\" when you're ready.", PLAY_AGAIN),
            )
            .reply_markup(keyboard)
            .await?;
        }
        return Ok(());
    }

    match text {
        NEXT_QUESTION | FINISH_QUIZ => match machine.advance() {
            Advance::NextQuestion => {
                send_current_question(&bot, msg.chat.id, &machine).await?;
                dialogue.update(State::FlagQuiz { machine }).await?;
            }
            Advance::Finished => {
                let score = machine.score();
                let total = machine.total();
                let percentage = (score * 100 + total / 2) / total.max(1);
                let keyboard = KeyboardMarkup::new(vec![vec![KeyboardButton::new(PLAY_AGAIN)]])
                    .resize_keyboard(true);
                bot.send_message(
                    msg.chat.id,
                    format!(
                        "Quiz complete! You answered {} out of {} questions correctly ({}%).",
                        score, total, percentage
                    ),
                )
                .reply_markup(keyboard)
                .await?;

                dialogue.update(State::FlagQuiz { machine }).await?;
            }
            Advance::NotReady => {
                bot.send_message(msg.chat.id, "Pick an answer first!").await?;
            }
        },
        answer => match machine.select_answer(answer) {
            Selection::Accepted { correct } => {
                let correct_answer = machine
                    .current_question()
                    .map(|question| question.correct_answer.clone())
                    .unwrap_or_default();

                if correct {
                    bot.send_message(msg.chat.id, "Correct!").await?;
                } else {
                    bot.send_message(
                        msg.chat.id,
                        format!("Wrong! The correct answer is {}.", correct_answer),
                    )
                    .await?;
                }

                let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;
                let explanation = helper.explain_flag(&correct_answer).await;

                let next_label = if machine.has_more_questions() {
                    NEXT_QUESTION
                } else {
                    FINISH_QUIZ
                };
                let keyboard = KeyboardMarkup::new(vec![vec![KeyboardButton::new(next_label)]])
                    .resize_keyboard(true);
                bot.send_message(
                    msg.chat.id,
                    format!(
                        "<b>The flag of {}</b>\n\n{}",
                        html::escape(&correct_answer),
                        format_explanation_html(&explanation)
                    ),
                )
                .parse_mode(ParseMode::Html)
                .reply_markup(keyboard)
                .await?;

                dialogue.update(State::FlagQuiz { machine }).await?;
            }
            Selection::AlreadyAnswered => {
                let next_label = if machine.has_more_questions() {
                    NEXT_QUESTION
                } else {
                    FINISH_QUIZ
                };
                bot.send_message(
                    msg.chat.id,
                    format!(
                        "You already picked {}. Press \"{}\" to continue.",
                        machine.selected_answer().unwrap_or_default(),
                        next_label
                    ),
                )
                .await?;
            }
            Selection::NotAnOption => {
                bot.send_message(msg.chat.id, "Please answer with one of the options")
                    .await?;
            }
            Selection::NotPlaying => {
                log::warn!(
                    "Quiz dialogue reached without an active question (phase {:?})",
                    machine.phase()
                );
                bot.send_message(msg.chat.id, "The quiz is over. What would you like to do?")
                    .reply_markup(menu_keyboard())
                    .await?;
                dialogue.update(State::ReceiveModeChoice).await?;
            }
        },
    }
    Ok(())
}

async fn browse(
    catalog: Arc<Catalog>,
    helper: Arc<FlagHelper>,
    bot: Bot,
    dialogue: BotDialogue,
    msg: Message,
) -> HandlerResult {
    let text = match msg.text() {
        Some(text) => text.trim(),
        None => {
            bot.send_message(msg.chat.id, "Please send a country name (as text)")
                .await?;
            return Ok(());
        }
    };

    if text == BACK_TO_MENU {
        bot.send_message(msg.chat.id, "What would you like to do?")
            .reply_markup(menu_keyboard())
            .await?;
        dialogue.update(State::ReceiveModeChoice).await?;
        return Ok(());
    }

    if let Some(country) = catalog.find(text) {
        send_country_detail(&helper, &bot, msg.chat.id, country).await?;
        return Ok(());
    }

    let matches = catalog.search(text);
    if matches.is_empty() {
        bot.send_message(
            msg.chat.id,
            format!("No countries match \"{}\". Try another name.", text),
        )
        .await?;
        return Ok(());
    }

    // Reply keyboards get unwieldy past a couple dozen rows
    const MAX_MATCH_BUTTONS: usize = 24;
    let shown = &matches[..matches.len().min(MAX_MATCH_BUTTONS)];
    let mut rows: Vec<Vec<KeyboardButton>> = shown
        .chunks(2)
        .map(|pair| {
            pair.iter()
                .map(|country| KeyboardButton::new(country.name.clone()))
                .collect()
        })
        .collect();
    rows.push(vec![KeyboardButton::new(BACK_TO_MENU)]);

    let note = if matches.len() > MAX_MATCH_BUTTONS {
        format!(
            "Found {} countries, showing the first {}. Keep typing to narrow it down, or pick one:",
            matches.len(),
            MAX_MATCH_BUTTONS
        )
    } else {
        "Pick a country:".to_string()
    };
    bot.send_message(msg.chat.id, note)
        .reply_markup(KeyboardMarkup::new(rows).resize_keyboard(true))
        .await?;
    Ok(())
}

async fn send_country_detail(
    helper: &FlagHelper,
    bot: &Bot,
    chat_id: ChatId,
    country: &Country,
) -> HandlerResult {
    let _ = bot.send_chat_action(chat_id, ChatAction::Typing).await;

    let flag = InputFile::url(Url::parse(&flag_url(&country.code, FlagSize::Detail))?);
    bot.send_photo(chat_id, flag)
        .caption(country.name.clone())
        .await?;

    let explanation = helper.explain_flag(&country.name).await;
    bot.send_message(
        chat_id,
        format!(
            "<b>The flag of {}</b>\n\n{}",
            html::escape(&country.name),
            format_explanation_html(&explanation)
        ),
    )
    .parse_mode(ParseMode::Html)
    .await?;
    Ok(())
}
