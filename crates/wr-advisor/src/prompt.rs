use std::borrow::Cow;
use wr_state::MatchupState;

/// Enemy item field when nothing has been bought yet
pub const NO_ITEMS_YET: &str = "尚未出装";

/// Instruction sent with every screenshot
pub const RECOGNITION_PROMPT: &str = "这是《英雄联盟手游》的屏幕截图（可能是对局内、加载界面或得分板）。\
请识别：1. 我方正在使用的英雄。 2. 敌方对线英雄（或者最明显的敌方英雄）。 \
3. 敌方已经出的主要装备名称。无法确认的英雄请填写\"未知\"。请以 JSON 格式返回。";

/// Enemy items joined for the prompt, or the "not yet equipped" sentinel
pub fn enemy_items_field(items: &[String]) -> Cow<'_, str> {
    if items.is_empty() {
        Cow::Borrowed(NO_ITEMS_YET)
    } else {
        Cow::Owned(items.join(", "))
    }
}

/// Coaching prompt for the current matchup
pub fn analysis_prompt(matchup: &MatchupState) -> String {
    format!(
        "你是一个《英雄联盟手游》(Wild Rift) 的世界级职业教练。\n\
         我方英雄: {my_hero}\n\
         我方位置: {role}\n\
         敌方对线英雄: {enemy_hero}\n\
         敌方当前已出装备: {items}\n\
         \n\
         请根据这些信息，提供专业的对战分析、出装建议和连招指导。\n\
         必须包含：\n\
         1. 对局分析：当前敌我强弱势点。\n\
         2. 针对性出装：推荐3件核心或针对性装备，并说明理由。\n\
         3. 核心连招：针对敌方英雄的2个高效连招。\n\
         4. 对局技巧：3个实战小贴士。\n",
        my_hero = matchup.my_hero,
        role = matchup.my_role.label(),
        enemy_hero = matchup.enemy_hero,
        items = enemy_items_field(&matchup.enemy_items),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use wr_state::Role;

    #[test]
    fn test_empty_items_use_sentinel() {
        let mut matchup = MatchupState {
            my_hero: "亚索".into(),
            my_role: Role::Top,
            enemy_hero: String::new(),
            enemy_items: vec![],
        };
        matchup.enemy_hero = "盖伦".into();

        let prompt = analysis_prompt(&matchup);
        assert!(prompt.contains("我方英雄: 亚索"));
        assert!(prompt.contains("我方位置: 上路"));
        assert!(prompt.contains("敌方对线英雄: 盖伦"));
        assert!(prompt.contains("敌方当前已出装备: 尚未出装"));
        assert!(!prompt.contains("[]"));
    }

    #[test]
    fn test_items_joined_in_order() {
        let items = vec!["水银之靴".to_string(), "守护者之铠".to_string(), "水银之靴".to_string()];
        assert_eq!(enemy_items_field(&items), "水银之靴, 守护者之铠, 水银之靴");
    }
}
