use crate::chain::{CodecChain, Transform};
use crate::version::is_before;
use crate::{ClientVersion, CodecError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChainKind {
    Schema,
    CryptJson,
    CryptBson,
    Bson,
    Text,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KnownTable {
    ActivityTable,
    AudioData,
    BattleEquipTable,
    BattleMiscTable,
    BuffTable,
    BuffTemplateData,
    BuildingData,
    BuildingLocalData,
    CampaignTable,
    ChapterTable,
    CharacterTable,
    CharmTable,
    CharwordTable,
    CharMasterTable,
    CharMetaTable,
    CharPatchTable,
    CheckinTable,
    ClimbTowerTable,
    ClueData,
    CooperateBattleTable,
    CrisisTable,
    CrisisV2Table,
    DataVersion,
    DisplayMetaTable,
    EnemyDatabase,
    EnemyHandbookTable,
    EpBreakbuffTable,
    ExtraBattlelogTable,
    FavorTable,
    GachaTable,
    GamedataConst,
    HandbookInfoTable,
    HandbookTable,
    HandbookTeamTable,
    HotupdateMetaTable,
    InitText,
    ItemTable,
    LegionModeBuffTable,
    LevelScriptTable,
    MainText,
    MedalTable,
    MetaUiTable,
    MissionTable,
    OpenServerTable,
    PlayerAvatarTable,
    RangeTable,
    ReplicateTable,
    RetroTable,
    RoguelikeTable,
    RoguelikeTopicTable,
    SandboxPermTable,
    SandboxTable,
    ShopClientTable,
    SkillTable,
    SkinTable,
    SpecialOperatorTable,
    StageTable,
    StoryReviewMetaTable,
    StoryReviewTable,
    StoryTable,
    TechBuffTable,
    TipTable,
    TokenTable,
    UniequipData,
    UniequipTable,
    ZoneTable,
}

#[derive(Clone, Copy, Debug)]
pub struct TableSpec {
    pub table: KnownTable,
    pub name: &'static str,
    pub chain: ChainKind,
    pub asset_dir: &'static str,
    pub available_since: Option<&'static str>,
}

const EXCEL: &str = "gamedata/excel/";
const BATTLE: &str = "gamedata/battle/";

const fn spec(
    table: KnownTable,
    name: &'static str,
    chain: ChainKind,
    asset_dir: &'static str,
    available_since: Option<&'static str>,
) -> TableSpec {
    TableSpec {
        table,
        name,
        chain,
        asset_dir,
        available_since,
    }
}

use ChainKind::{Bson as B, CryptBson as CB, CryptJson as CJ, Schema as S, Text as T};
use KnownTable as K;

const V2504: Option<&str> = Some("2.5.04");

pub static KNOWN_TABLES: &[TableSpec] = &[
    spec(K::ActivityTable, "activity_table", S, EXCEL, None),
    spec(K::AudioData, "audio_data", S, EXCEL, None),
    spec(K::BattleEquipTable, "battle_equip_table", S, EXCEL, None),
    spec(K::BattleMiscTable, "battle_misc_table", CB, BATTLE, None),
    spec(K::BuffTable, "buff_table", S, "gamedata/", None),
    spec(K::BuffTemplateData, "buff_template_data", B, BATTLE, None),
    spec(K::BuildingData, "building_data", S, EXCEL, None),
    spec(K::BuildingLocalData, "building_local_data", S, "gamedata/building/", Some("2.4.41")),
    spec(K::CampaignTable, "campaign_table", S, EXCEL, None),
    spec(K::ChapterTable, "chapter_table", S, EXCEL, None),
    spec(K::CharacterTable, "character_table", S, EXCEL, None),
    spec(K::CharmTable, "charm_table", S, EXCEL, None),
    spec(K::CharwordTable, "charword_table", S, EXCEL, None),
    spec(K::CharMasterTable, "char_master_table", S, EXCEL, Some("2.6.01")),
    spec(K::CharMetaTable, "char_meta_table", S, EXCEL, None),
    spec(K::CharPatchTable, "char_patch_table", S, EXCEL, None),
    spec(K::CheckinTable, "checkin_table", S, EXCEL, None),
    spec(K::ClimbTowerTable, "climb_tower_table", S, EXCEL, None),
    spec(K::ClueData, "clue_data", S, EXCEL, V2504),
    spec(K::CooperateBattleTable, "cooperate_battle_table", S, BATTLE, None),
    spec(K::CrisisTable, "crisis_table", S, EXCEL, V2504),
    spec(K::CrisisV2Table, "crisis_v2_table", S, EXCEL, V2504),
    spec(K::DataVersion, "data_version", T, EXCEL, None),
    spec(K::DisplayMetaTable, "display_meta_table", S, EXCEL, V2504),
    spec(K::EnemyDatabase, "enemy_database", S, "gamedata/levels/enemydata/", None),
    spec(K::EnemyHandbookTable, "enemy_handbook_table", S, EXCEL, None),
    spec(K::EpBreakbuffTable, "ep_breakbuff_table", S, BATTLE, None),
    spec(K::ExtraBattlelogTable, "extra_battlelog_table", S, BATTLE, None),
    spec(K::FavorTable, "favor_table", S, EXCEL, None),
    spec(K::GachaTable, "gacha_table", S, EXCEL, None),
    spec(K::GamedataConst, "gamedata_const", S, EXCEL, None),
    spec(K::HandbookInfoTable, "handbook_info_table", S, EXCEL, None),
    spec(K::HandbookTable, "handbook_table", CJ, EXCEL, None),
    spec(K::HandbookTeamTable, "handbook_team_table", S, EXCEL, V2504),
    spec(K::HotupdateMetaTable, "hotupdate_meta_table", S, EXCEL, None),
    spec(K::InitText, "init_text", S, EXCEL, V2504),
    spec(K::ItemTable, "item_table", S, EXCEL, None),
    spec(K::LegionModeBuffTable, "legion_mode_buff_table", S, BATTLE, V2504),
    spec(K::LevelScriptTable, "level_script_table", S, BATTLE, Some("2.6.21")),
    spec(K::MainText, "main_text", S, EXCEL, V2504),
    spec(K::MedalTable, "medal_table", S, EXCEL, None),
    spec(K::MetaUiTable, "meta_ui_table", S, EXCEL, V2504),
    spec(K::MissionTable, "mission_table", S, EXCEL, None),
    spec(K::OpenServerTable, "open_server_table", S, EXCEL, None),
    spec(K::PlayerAvatarTable, "player_avatar_table", CJ, EXCEL, None),
    spec(K::RangeTable, "range_table", CJ, EXCEL, None),
    spec(K::ReplicateTable, "replicate_table", S, EXCEL, None),
    spec(K::RetroTable, "retro_table", S, EXCEL, None),
    spec(K::RoguelikeTable, "roguelike_table", CJ, EXCEL, None),
    spec(K::RoguelikeTopicTable, "roguelike_topic_table", S, EXCEL, None),
    spec(K::SandboxPermTable, "sandbox_perm_table", S, EXCEL, None),
    spec(K::SandboxTable, "sandbox_table", CJ, EXCEL, Some("2.4.21")),
    spec(K::ShopClientTable, "shop_client_table", S, EXCEL, None),
    spec(K::SkillTable, "skill_table", S, EXCEL, None),
    spec(K::SkinTable, "skin_table", S, EXCEL, None),
    spec(K::SpecialOperatorTable, "special_operator_table", S, EXCEL, Some("2.6.01")),
    spec(K::StageTable, "stage_table", S, EXCEL, None),
    spec(K::StoryReviewMetaTable, "story_review_meta_table", S, EXCEL, None),
    spec(K::StoryReviewTable, "story_review_table", S, EXCEL, None),
    spec(K::StoryTable, "story_table", S, EXCEL, None),
    spec(K::TechBuffTable, "tech_buff_table", CJ, EXCEL, None),
    spec(K::TipTable, "tip_table", S, EXCEL, None),
    spec(K::TokenTable, "token_table", S, EXCEL, None),
    spec(K::UniequipData, "uniequip_data", CJ, EXCEL, None),
    spec(K::UniequipTable, "uniequip_table", S, EXCEL, None),
    spec(K::ZoneTable, "zone_table", S, EXCEL, None),
];

impl KnownTable {
    /// Rows of `KNOWN_TABLES` are declared in variant order.
    pub fn spec(self) -> &'static TableSpec {
        &KNOWN_TABLES[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn from_name(name: &str) -> Result<Self, CodecError> {
        KNOWN_TABLES
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.table)
            .ok_or_else(|| CodecError::UnknownTable(name.to_string()))
    }

    pub fn all() -> impl Iterator<Item = KnownTable> {
        KNOWN_TABLES.iter().map(|spec| spec.table)
    }

    /// Manifest asset-name prefix, e.g. `gamedata/excel/character_table`.
    pub fn asset_name_prefix(self) -> String {
        let spec = self.spec();
        format!("{}{}", spec.asset_dir, spec.name)
    }

    pub fn is_available(self, version: &ClientVersion) -> bool {
        match self.spec().available_since {
            Some(since) => !is_before(version, since),
            None => true,
        }
    }

    pub fn chain(self, version: &ClientVersion, res_version: &str) -> CodecChain {
        let spec = self.spec();
        let dump = Transform::dump(format!("{}_{}", spec.name, res_version));
        let transforms = match spec.chain {
            ChainKind::Schema => vec![
                Transform::Header,
                Transform::schema(version, spec.name),
                dump,
            ],
            ChainKind::CryptJson => vec![
                Transform::Header,
                Transform::Crypt,
                Transform::Utf8,
                Transform::Json,
                dump,
            ],
            ChainKind::CryptBson => {
                vec![Transform::Header, Transform::Crypt, Transform::Bson, dump]
            }
            ChainKind::Bson => vec![Transform::Bson, dump],
            ChainKind::Text => vec![Transform::Utf8, dump],
        };
        CodecChain::new(transforms)
    }
}

pub fn level_chain(level_id: &str, version: &ClientVersion, res_version: &str) -> CodecChain {
    CodecChain::new(vec![
        Transform::Header,
        Transform::schema(version, crate::LEVEL_SCHEMA),
        Transform::dump(format!("{}_{}", level_id, res_version)),
    ])
}

pub fn manifest_chain(version: &ClientVersion) -> CodecChain {
    CodecChain::new(vec![
        Transform::Header,
        Transform::schema(version, crate::MANIFEST_SCHEMA),
    ])
}
