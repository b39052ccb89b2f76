/// Locales the service can answer in. Unrecognized tags fall back to
/// English rather than failing the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Kk,
    Ru,
}

impl Locale {
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "kk" => Locale::Kk,
            "ru" => Locale::Ru,
            _ => Locale::En,
        }
    }

    pub fn is_known_tag(tag: &str) -> bool {
        matches!(tag.trim().to_ascii_lowercase().as_str(), "en" | "kk" | "ru")
    }

    pub fn tag(self) -> &'static str {
        match self {
            Locale::En => "en",
            Locale::Kk => "kk",
            Locale::Ru => "ru",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKey {
    PredictionsRemaining,
    PredictionsAssignments,
    AlreadyHighest,
    AlreadyReached,
    Reachable,
    NotReachable,
    InvalidGrades,
    ScoreExceedsMax,
    MalformedInput,
    InvalidRequest,
}

/// Display strings in [en, kk, ru] order.
pub fn text(key: MessageKey, locale: Locale) -> &'static str {
    let [en, kk, ru] = match key {
        MessageKey::PredictionsRemaining => [
            "Grade predictions for remaining assessments:",
            "Қалған бағалаулар үшін баға болжамдары:",
            "Прогнозы оценок для оставшихся оценок:",
        ],
        MessageKey::PredictionsAssignments => [
            "Grade predictions with additional perfect assignments:",
            "Қосымша тамаша тапсырмалармен баға болжамдары:",
            "Прогнозы оценок с дополнительными идеальными заданиями:",
        ],
        MessageKey::AlreadyHighest => [
            "Congratulations! You already have the highest grade.",
            "Құттықтаймыз! Сізде қазірдің өзінде ең жоғары баға бар.",
            "Поздравляем! У вас уже есть самая высокая оценка.",
        ],
        MessageKey::AlreadyReached => [
            "Already reached",
            "Қазірдің өзінде жетті",
            "Уже достигнуто",
        ],
        MessageKey::Reachable => ["Reachable", "Қол жетімді", "Достижимо"],
        MessageKey::NotReachable => ["Not reachable", "Қол жетімсіз", "Недостижимо"],
        MessageKey::InvalidGrades => [
            "All grades must be between 0 and 10",
            "Барлық бағалар 0 және 10 арасында болуы керек",
            "Все оценки должны быть между 0 и 10",
        ],
        MessageKey::ScoreExceedsMax => [
            "A score exceeds its declared maximum",
            "Баға жарияланған максимумнан асып түседі",
            "Оценка превышает заявленный максимум",
        ],
        MessageKey::MalformedInput => [
            "Malformed input",
            "Кіріс деректерінің пішімі жарамсыз",
            "Неверный формат входных данных",
        ],
        MessageKey::InvalidRequest => ["Invalid request", "Жарамсыз сұрау", "Неверный запрос"],
    };
    match locale {
        Locale::En => en,
        Locale::Kk => kk,
        Locale::Ru => ru,
    }
}
